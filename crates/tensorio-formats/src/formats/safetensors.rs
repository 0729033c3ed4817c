//! `.safetensors` flat tensor-map codec
//!
//! Thin adapter over the `safetensors` crate: dtype mapping in both
//! directions, contiguity through [`TensorView`], and error translation.

use ::safetensors::tensor::{SafeTensorError, TensorView as StView, serialize, serialize_to_file};
use ::safetensors::{Dtype, SafeTensors};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use tensorio_common::{DType, Result, Tensor, TensorIoError, TensorView, contiguous_data};
use tensorio_gguf::TensorMap;
use tracing::debug;

/// Free-form `__metadata__` string table.
pub type StringMetadata = HashMap<String, String>;

pub fn to_st_dtype(dtype: DType) -> Option<Dtype> {
    Some(match dtype {
        DType::Bool => Dtype::BOOL,
        DType::U8 => Dtype::U8,
        DType::U16 => Dtype::U16,
        DType::U32 => Dtype::U32,
        DType::U64 => Dtype::U64,
        DType::I8 => Dtype::I8,
        DType::I16 => Dtype::I16,
        DType::I32 => Dtype::I32,
        DType::I64 => Dtype::I64,
        DType::F16 => Dtype::F16,
        DType::BF16 => Dtype::BF16,
        DType::F32 => Dtype::F32,
        DType::F64 => Dtype::F64,
        DType::C64 => return None,
    })
}

pub fn from_st_dtype(dtype: Dtype) -> Option<DType> {
    Some(match dtype {
        Dtype::BOOL => DType::Bool,
        Dtype::U8 => DType::U8,
        Dtype::U16 => DType::U16,
        Dtype::U32 => DType::U32,
        Dtype::U64 => DType::U64,
        Dtype::I8 => DType::I8,
        Dtype::I16 => DType::I16,
        Dtype::I32 => DType::I32,
        Dtype::I64 => DType::I64,
        Dtype::F16 => DType::F16,
        Dtype::BF16 => DType::BF16,
        Dtype::F32 => DType::F32,
        Dtype::F64 => DType::F64,
        _ => return None,
    })
}

fn st_error(e: SafeTensorError) -> TensorIoError {
    match e {
        SafeTensorError::IoError(io) => TensorIoError::Stream(io),
        other => TensorIoError::format(format!("safetensors: {other}")),
    }
}

/// Decode a complete `.safetensors` buffer.
pub fn decode(buffer: &[u8]) -> Result<(TensorMap, StringMetadata)> {
    let (_, header) = SafeTensors::read_metadata(buffer).map_err(st_error)?;
    let metadata = header.metadata().clone().unwrap_or_default();
    let st = SafeTensors::deserialize(buffer).map_err(st_error)?;

    let mut tensors = TensorMap::with_capacity(st.len());
    for (name, view) in st.tensors() {
        let dtype = from_st_dtype(view.dtype()).ok_or_else(|| {
            TensorIoError::format(format!(
                "`{name}`: safetensors dtype {:?} has no host equivalent",
                view.dtype()
            ))
        })?;
        let tensor = Tensor::from_bytes(dtype, view.shape().to_vec(), view.data().to_vec())?;
        debug!(tensor = %name, %dtype, shape = ?view.shape(), "read safetensors tensor");
        tensors.insert(name, tensor);
    }
    Ok((tensors, metadata))
}

struct Prepared<'a> {
    name: &'a str,
    dtype: Dtype,
    shape: Vec<usize>,
    bytes: Cow<'a, [u8]>,
}

fn prepare<T: TensorView>(tensors: &HashMap<String, T>) -> Result<Vec<Prepared<'_>>> {
    let mut names: Vec<&String> = tensors.keys().collect();
    names.sort();
    names
        .into_iter()
        .map(|name| {
            let tensor = &tensors[name];
            let dtype = to_st_dtype(tensor.dtype())
                .ok_or_else(|| TensorIoError::unsupported(name.as_str(), tensor.dtype()))?;
            Ok(Prepared {
                name,
                dtype,
                shape: tensor.shape().to_vec(),
                bytes: contiguous_data(name, tensor)?,
            })
        })
        .collect()
}

fn views<'a>(prepared: &'a [Prepared<'a>]) -> Result<Vec<(&'a str, StView<'a>)>> {
    prepared
        .iter()
        .map(|p| {
            let view = StView::new(p.dtype, p.shape.clone(), &p.bytes).map_err(|e| {
                TensorIoError::contiguity(p.name, format!("rejected by safetensors: {e}"))
            })?;
            Ok((p.name, view))
        })
        .collect()
}

fn info(metadata: &StringMetadata) -> Option<StringMetadata> {
    (!metadata.is_empty()).then(|| metadata.clone())
}

/// Serialize to an in-memory `.safetensors` buffer.
pub fn encode<T: TensorView>(
    tensors: &HashMap<String, T>,
    metadata: &StringMetadata,
) -> Result<Vec<u8>> {
    let prepared = prepare(tensors)?;
    let views = views(&prepared)?;
    serialize(views, info(metadata)).map_err(st_error)
}

/// Serialize straight to `path`.
pub fn encode_to_file<T: TensorView>(
    path: &Path,
    tensors: &HashMap<String, T>,
    metadata: &StringMetadata,
) -> Result<()> {
    let prepared = prepare(tensors)?;
    let views = views(&prepared)?;
    serialize_to_file(views, info(metadata), path).map_err(|e| match e {
        SafeTensorError::IoError(io) => TensorIoError::io(path, io),
        other => st_error(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_table_round_trips() {
        for dtype in DType::ALL {
            match to_st_dtype(dtype) {
                Some(st) => assert_eq!(from_st_dtype(st), Some(dtype)),
                None => assert_eq!(dtype, DType::C64),
            }
        }
    }

    #[test]
    fn encode_decode_with_metadata() {
        let mut tensors = HashMap::new();
        tensors.insert("a".to_string(), Tensor::from_slice(&[1u16, 2, 3, 4], &[2, 2]).unwrap());
        tensors.insert("b".to_string(), Tensor::from_bools(&[true, false], &[2]).unwrap());
        let metadata = StringMetadata::from([("format".to_string(), "pt".to_string())]);

        let buffer = encode(&tensors, &metadata).unwrap();
        let (back, meta) = decode(&buffer).unwrap();
        assert_eq!(back, tensors);
        assert_eq!(meta, metadata);
    }

    #[test]
    fn complex64_is_rejected() {
        let tensors = HashMap::from([("z".to_string(), Tensor::zeros(DType::C64, &[1]))]);
        let err = encode(&tensors, &StringMetadata::new()).unwrap_err();
        assert!(matches!(err, TensorIoError::UnsupportedType { dtype: DType::C64, .. }));
    }

    #[test]
    fn garbage_is_a_format_error() {
        let err = decode(&[1, 0, 0, 0, 0, 0, 0, 0, b'{']).unwrap_err();
        assert!(matches!(err, TensorIoError::Format(_)));
    }
}
