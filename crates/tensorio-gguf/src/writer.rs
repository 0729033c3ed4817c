//! GGUF save pipeline
//!
//! Everything that can be rejected (dtypes, contiguity, metadata encoding) is
//! checked before the output file is created, so a bad input never clobbers
//! an existing file. Failures while writing remove the partial file.

use crate::context::ContainerContext;
use crate::metadata::{self, MetadataValue};
use crate::reader::MetadataMap;
use crate::{ALIGNMENT_KEY, GgmlType, GgufValueType, dtype_map};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tensorio_common::{
    CodecConfig, DEFAULT_ALIGNMENT, DType, Result, Tensor, TensorIoError, TensorView, align_up,
    contiguous_data,
};
use tracing::{debug, info};

/// `path` with a `.gguf` extension appended when it has a different one.
pub fn gguf_path(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gguf")) {
        path.to_path_buf()
    } else {
        let mut s = path.as_os_str().to_owned();
        s.push(".gguf");
        PathBuf::from(s)
    }
}

struct PreparedKv {
    key: String,
    tag: GgufValueType,
    bytes: Vec<u8>,
}

struct PreparedTensor<'a> {
    name: &'a str,
    shape: Vec<usize>,
    ggml_type: GgmlType,
    offset: u64,
    bytes: Cow<'a, [u8]>,
}

/// Resolve the alignment to write with and encode every record in key order.
fn prepare_metadata(
    metadata: &MetadataMap,
    config: &CodecConfig,
) -> Result<(usize, Vec<PreparedKv>)> {
    let mut alignment = config.alignment;
    let mut kvs = Vec::with_capacity(metadata.len() + 1);

    match metadata.get(ALIGNMENT_KEY) {
        Some(value) => {
            let declared = match value {
                MetadataValue::Scalar(t) if t.dtype() == DType::U32 => value.as_u64(),
                _ => None,
            };
            let declared = declared.ok_or_else(|| {
                TensorIoError::format(format!("`{ALIGNMENT_KEY}` must be a u32 scalar"))
            })?;
            alignment = declared as usize;
            CodecConfig { alignment, ..config.clone() }.validate()?;
        }
        None if config.alignment != DEFAULT_ALIGNMENT => {
            let value = MetadataValue::Scalar(Tensor::scalar(config.alignment as u32));
            let (tag, bytes) = metadata::encode_value(ALIGNMENT_KEY, &value)?;
            kvs.push(PreparedKv { key: ALIGNMENT_KEY.to_owned(), tag, bytes });
        }
        None => {}
    }

    let mut keys: Vec<&String> = metadata.keys().collect();
    keys.sort();
    for key in keys {
        let (tag, bytes) = metadata::encode_value(key, &metadata[key])?;
        kvs.push(PreparedKv { key: key.clone(), tag, bytes });
    }
    Ok((alignment, kvs))
}

/// Map, make contiguous and lay out every tensor in name order.
fn prepare_tensors<'a, T: TensorView>(
    tensors: &'a HashMap<String, T>,
    alignment: usize,
) -> Result<Vec<PreparedTensor<'a>>> {
    let mut names: Vec<&String> = tensors.keys().collect();
    names.sort();

    let mut prepared = Vec::with_capacity(names.len());
    let mut next_offset = 0usize;
    for name in names {
        let tensor = &tensors[name];
        let ggml_type = dtype_map::to_file_code(tensor.dtype())
            .ok_or_else(|| TensorIoError::unsupported(name.as_str(), tensor.dtype()))?;
        let bytes = contiguous_data(name, tensor)?;
        let offset = next_offset;
        next_offset = align_up(offset + bytes.len(), alignment);
        debug!(tensor = %name, %ggml_type, offset, size = bytes.len(), "laid out tensor");
        prepared.push(PreparedTensor {
            name,
            shape: tensor.shape().to_vec(),
            ggml_type,
            offset: offset as u64,
            bytes,
        });
    }
    Ok(prepared)
}

/// Save `tensors` and `metadata` to `path` with the default configuration.
///
/// Returns the path actually written (`.gguf` is appended when missing).
pub fn save_gguf<T: TensorView>(
    path: impl AsRef<Path>,
    tensors: &HashMap<String, T>,
    metadata: &MetadataMap,
) -> Result<PathBuf> {
    save_gguf_with_config(path, tensors, metadata, &CodecConfig::from_env())
}

pub fn save_gguf_with_config<T: TensorView>(
    path: impl AsRef<Path>,
    tensors: &HashMap<String, T>,
    metadata: &MetadataMap,
    config: &CodecConfig,
) -> Result<PathBuf> {
    config.validate()?;
    let path = gguf_path(path.as_ref());

    let (alignment, kvs) = prepare_metadata(metadata, config)?;
    let prepared = prepare_tensors(tensors, alignment)?;

    let mut ctx = ContainerContext::create(&path, &CodecConfig { alignment, ..config.clone() })?;
    for kv in &kvs {
        ctx.append_raw_kv(&kv.key, kv.tag, &kv.bytes)?;
    }
    for t in &prepared {
        ctx.append_tensor_info(t.name, &t.shape, t.ggml_type, t.offset)?;
    }
    for t in &prepared {
        ctx.append_tensor_data(&t.bytes)?;
    }
    ctx.close()?;

    info!(
        path = %path.display(),
        tensors = prepared.len(),
        metadata = kvs.len(),
        alignment,
        "saved GGUF file"
    );
    Ok(path)
}
