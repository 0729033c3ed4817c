//! GGUF metadata value codec
//!
//! A metadata record on disk is `[u64 key_len][key][u32 type][value]`. This
//! module handles the `value` part for a given type tag:
//!
//! | tag | layout |
//! |---|---|
//! | scalar | bare little-endian value |
//! | string | `[u64 len][bytes]` |
//! | array | `[u32 inner tag][u64 count]` then `count` inner values |
//!
//! Arrays nest at most one level: an array whose inner tag is itself an array
//! is rejected.

use crate::cursor::ByteCursor;
use crate::GgufValueType;
use tensorio_common::{DType, Result, Tensor, TensorIoError};

/// A decoded metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// No value. Never produced by decoding and rejected by encoding.
    Empty,
    /// Numeric or boolean scalar, held as a 0-dimensional tensor.
    Scalar(Tensor),
    /// Homogeneous numeric or boolean array, held as a 1-D tensor.
    Array(Tensor),
    String(String),
    StringArray(Vec<String>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Scalar(t) | Self::Array(t) => Some(t),
            _ => None,
        }
    }

    /// Scalar as `u64` for any unsigned or non-negative signed integer dtype.
    pub fn as_u64(&self) -> Option<u64> {
        let Self::Scalar(t) = self else { return None };
        if t.numel() != 1 {
            return None;
        }
        let b = t.data();
        match t.dtype() {
            DType::U8 => Some(u64::from(b[0])),
            DType::U16 => Some(u64::from(u16::from_le_bytes([b[0], b[1]]))),
            DType::U32 => Some(u64::from(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
            DType::U64 => b.try_into().ok().map(u64::from_le_bytes),
            DType::I8 | DType::I16 | DType::I32 | DType::I64 => {
                let mut wide = [0u8; 8];
                let n = t.dtype().size();
                wide[..n].copy_from_slice(b);
                // negative values have no u64 form
                if b[n - 1] & 0x80 != 0 {
                    return None;
                }
                Some(u64::from_le_bytes(wide))
            }
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(v: Vec<String>) -> Self {
        Self::StringArray(v)
    }
}

/// Host dtype a numeric value tag decodes into. `Float64` narrows to `F32`.
const fn decoded_dtype(tag: GgufValueType) -> Option<DType> {
    match tag {
        GgufValueType::Uint8 => Some(DType::U8),
        GgufValueType::Int8 => Some(DType::I8),
        GgufValueType::Uint16 => Some(DType::U16),
        GgufValueType::Int16 => Some(DType::I16),
        GgufValueType::Uint32 => Some(DType::U32),
        GgufValueType::Int32 => Some(DType::I32),
        GgufValueType::Uint64 => Some(DType::U64),
        GgufValueType::Int64 => Some(DType::I64),
        GgufValueType::Float32 | GgufValueType::Float64 => Some(DType::F32),
        GgufValueType::Bool => Some(DType::Bool),
        GgufValueType::String | GgufValueType::Array => None,
    }
}

/// Value tag a host dtype is written as in metadata.
pub const fn metadata_tag(dtype: DType) -> Option<GgufValueType> {
    match dtype {
        DType::F32 => Some(GgufValueType::Float32),
        DType::I64 => Some(GgufValueType::Int64),
        DType::I32 => Some(GgufValueType::Int32),
        DType::I16 => Some(GgufValueType::Int16),
        DType::I8 => Some(GgufValueType::Int8),
        DType::U64 => Some(GgufValueType::Uint64),
        DType::U32 => Some(GgufValueType::Uint32),
        DType::U16 => Some(GgufValueType::Uint16),
        DType::U8 => Some(GgufValueType::Uint8),
        DType::Bool => Some(GgufValueType::Bool),
        _ => None,
    }
}

/// Raw little-endian element bytes for `count` values of `tag`, narrowing
/// `Float64` to `f32`.
fn read_numeric(c: &mut ByteCursor<'_>, tag: GgufValueType, count: usize) -> Result<Vec<u8>> {
    let width = tag.scalar_size().ok_or_else(|| {
        TensorIoError::format(format!("{tag:?} is not a numeric metadata type"))
    })?;
    let len = count.checked_mul(width).ok_or_else(|| {
        TensorIoError::format(format!("{count} elements of {tag:?} overflow usize"))
    })?;
    let bytes = c.read_bytes(len)?;
    if tag == GgufValueType::Float64 {
        return Ok(bytes
            .chunks_exact(8)
            .flat_map(|chunk| {
                let mut v = [0u8; 8];
                v.copy_from_slice(chunk);
                (f64::from_le_bytes(v) as f32).to_le_bytes()
            })
            .collect());
    }
    Ok(bytes.to_vec())
}

/// Decode one value of type `raw_tag` starting at the cursor.
///
/// On success the cursor sits on the first byte after the value.
pub fn decode_value(c: &mut ByteCursor<'_>, raw_tag: u32) -> Result<MetadataValue> {
    let tag = GgufValueType::from_u32(raw_tag)
        .ok_or_else(|| TensorIoError::format(format!("unknown metadata value type {raw_tag}")))?;

    match tag {
        GgufValueType::String => Ok(MetadataValue::String(c.read_string()?)),
        GgufValueType::Array => decode_array(c),
        scalar => {
            let dtype = decoded_dtype(scalar).ok_or_else(|| {
                TensorIoError::format(format!("{scalar:?} is not a scalar metadata type"))
            })?;
            let bytes = read_numeric(c, scalar, 1)?;
            Ok(MetadataValue::Scalar(Tensor::from_bytes(dtype, Vec::new(), bytes)?))
        }
    }
}

fn decode_array(c: &mut ByteCursor<'_>) -> Result<MetadataValue> {
    let raw_inner = c.read_u32()?;
    let inner = GgufValueType::from_u32(raw_inner).ok_or_else(|| {
        TensorIoError::format(format!("unknown metadata array element type {raw_inner}"))
    })?;
    if inner == GgufValueType::Array {
        return Err(TensorIoError::format("nested arrays beyond one level are unsupported"));
    }
    let count = c.read_len("metadata array")?;

    match inner {
        GgufValueType::String => {
            let mut strings = Vec::new();
            for _ in 0..count {
                strings.push(c.read_string()?);
            }
            Ok(MetadataValue::StringArray(strings))
        }
        numeric => {
            let dtype = decoded_dtype(numeric).ok_or_else(|| {
                TensorIoError::format(format!("{numeric:?} cannot be an array element"))
            })?;
            let bytes = read_numeric(c, numeric, count)?;
            Ok(MetadataValue::Array(Tensor::from_bytes(dtype, vec![count], bytes)?))
        }
    }
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u64).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn numeric_tag(key: &str, tensor: &Tensor) -> Result<GgufValueType> {
    metadata_tag(tensor.dtype()).ok_or_else(|| TensorIoError::unsupported(key, tensor.dtype()))
}

/// Encode `value` for the metadata record `key`.
///
/// Returns the value tag and the value bytes (the tag itself is not included).
pub fn encode_value(key: &str, value: &MetadataValue) -> Result<(GgufValueType, Vec<u8>)> {
    match value {
        MetadataValue::Empty => {
            Err(TensorIoError::format(format!("metadata `{key}` has no value to encode")))
        }
        MetadataValue::String(s) => {
            let mut out = Vec::with_capacity(8 + s.len());
            put_string(&mut out, s);
            Ok((GgufValueType::String, out))
        }
        MetadataValue::StringArray(strings) => {
            let payload: usize = strings.iter().map(|s| 8 + s.len()).sum();
            let mut out = Vec::with_capacity(12 + payload);
            out.extend_from_slice(&GgufValueType::String.as_u32().to_le_bytes());
            out.extend_from_slice(&(strings.len() as u64).to_le_bytes());
            for s in strings {
                put_string(&mut out, s);
            }
            Ok((GgufValueType::Array, out))
        }
        MetadataValue::Scalar(t) => {
            if t.numel() != 1 || t.ndim() > 1 {
                return Err(TensorIoError::contiguity(
                    key,
                    format!(
                        "scalar metadata must hold exactly one element, got shape {:?}",
                        t.shape()
                    ),
                ));
            }
            let tag = numeric_tag(key, t)?;
            Ok((tag, t.data().to_vec()))
        }
        MetadataValue::Array(t) => {
            if t.ndim() != 1 {
                return Err(TensorIoError::contiguity(
                    key,
                    format!("cannot save arrays with {} dimensions as metadata", t.ndim()),
                ));
            }
            if t.numel() == 0 {
                return Err(TensorIoError::contiguity(key, "cannot save empty arrays as metadata"));
            }
            let tag = numeric_tag(key, t)?;
            let mut out = Vec::with_capacity(12 + t.nbytes());
            out.extend_from_slice(&tag.as_u32().to_le_bytes());
            out.extend_from_slice(&(t.numel() as u64).to_le_bytes());
            out.extend_from_slice(t.data());
            Ok((GgufValueType::Array, out))
        }
    }
}
