//! NumPy `.npy` single-array codec
//!
//! Layout: `\x93NUMPY` | major(1) | minor(1) | header_len (u16 for 1.x, u32
//! for 2.x/3.x) | header dict | data. Version 1.0 is written unless the
//! header does not fit a u16 length, in which case 2.0 is used.

use std::io::{Read, Write};
use tensorio_common::{DType, Result, Tensor, TensorIoError, TensorView, contiguous_data};
use tracing::debug;

pub const NUMPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Name used in errors; a `.npy` file holds one unnamed array.
const ARRAY_NAME: &str = "array";

/// Type code (without byte-order prefix) for a host dtype.
fn type_code(dtype: DType) -> Option<&'static str> {
    Some(match dtype {
        DType::Bool => "b1",
        DType::U8 => "u1",
        DType::U16 => "u2",
        DType::U32 => "u4",
        DType::U64 => "u8",
        DType::I8 => "i1",
        DType::I16 => "i2",
        DType::I32 => "i4",
        DType::I64 => "i8",
        DType::F16 => "f2",
        DType::F32 => "f4",
        DType::F64 => "f8",
        DType::C64 => "c8",
        // numpy stores bfloat16 as an opaque void type
        DType::BF16 => return None,
    })
}

fn from_type_code(code: &str) -> Option<DType> {
    DType::ALL.into_iter().find(|&d| type_code(d) == Some(code))
}

pub fn numpy_descr(dtype: DType) -> Option<String> {
    let code = type_code(dtype)?;
    let order = if dtype.size() == 1 { '|' } else { '<' };
    Some(format!("{order}{code}"))
}

/// `(dtype, swap_bytes)` for a descr string such as `<f4` or `>i8`.
fn parse_descr_value(descr: &str) -> Result<(DType, bool)> {
    let (order, code) = match descr.chars().next() {
        Some(c @ ('<' | '>' | '|' | '=')) => (c, &descr[1..]),
        _ => ('=', descr),
    };
    let dtype = from_type_code(code)
        .ok_or_else(|| TensorIoError::format(format!("unsupported numpy descr '{descr}'")))?;
    let swap = order == '>' && dtype.size() > 1;
    Ok((dtype, swap))
}

/// Value text following `'key':` in a header dict, up to the next top-level comma.
fn dict_value<'h>(header: &'h str, key: &str) -> Result<&'h str> {
    let pattern = format!("'{key}'");
    let at = header
        .find(&pattern)
        .ok_or_else(|| TensorIoError::format(format!("npy header is missing '{key}'")))?;
    let rest = header[at + pattern.len()..].trim_start();
    let rest = rest
        .strip_prefix(':')
        .ok_or_else(|| TensorIoError::format(format!("npy header: malformed '{key}' entry")))?
        .trim_start();
    let mut depth = 0usize;
    for (i, ch) in rest.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' | '}' if depth == 0 => return Ok(rest[..i].trim()),
            _ => {}
        }
    }
    Err(TensorIoError::format(format!("npy header: unterminated '{key}' entry")))
}

fn parse_shape(value: &str) -> Result<Vec<usize>> {
    let inner = value
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .ok_or_else(|| TensorIoError::format(format!("npy header: bad shape {value}")))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|e| TensorIoError::format(format!("npy header: bad shape dim '{s}': {e}")))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub swap_bytes: bool,
}

pub fn parse_header(header: &str) -> Result<NpyHeader> {
    let descr = dict_value(header, "descr")?;
    let descr = descr.trim_matches(|c| c == '\'' || c == '"');
    let (dtype, swap_bytes) = parse_descr_value(descr)?;

    match dict_value(header, "fortran_order")? {
        "False" => {}
        "True" => {
            return Err(TensorIoError::format("fortran-ordered npy arrays are not supported"));
        }
        other => {
            return Err(TensorIoError::format(format!("npy header: bad fortran_order {other}")));
        }
    }

    let shape = parse_shape(dict_value(header, "shape")?)?;
    Ok(NpyHeader { dtype, shape, swap_bytes })
}

fn header_dict(dtype: DType, shape: &[usize]) -> Result<String> {
    let descr = numpy_descr(dtype).ok_or_else(|| TensorIoError::unsupported(ARRAY_NAME, dtype))?;
    let shape_str = if shape.len() == 1 {
        format!("({},)", shape[0])
    } else {
        let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
        format!("({})", dims.join(", "))
    };
    Ok(format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape_str}, }}"))
}

/// Write `tensor` as an `.npy` stream.
pub fn write<W: Write, T: TensorView + ?Sized>(writer: &mut W, tensor: &T) -> Result<()> {
    let dict = header_dict(tensor.dtype(), tensor.shape())?;
    let data = contiguous_data(ARRAY_NAME, tensor)?;

    // Pad to 64-byte alignment
    let mut prefix_len = 6 + 1 + 1 + 2; // magic + major + minor + header_len
    let mut unpadded = prefix_len + dict.len() + 1; // +1 for newline
    let mut padding = (64 - (unpadded % 64)) % 64;
    let major = if unpadded + padding - prefix_len > u16::MAX as usize {
        prefix_len += 2;
        unpadded += 2;
        padding = (64 - (unpadded % 64)) % 64;
        2u8
    } else {
        1u8
    };
    let padded_header = format!("{dict}{}\n", " ".repeat(padding));

    writer.write_all(NUMPY_MAGIC)?;
    writer.write_all(&[major, 0u8])?;
    if major == 1 {
        writer.write_all(&(padded_header.len() as u16).to_le_bytes())?;
    } else {
        writer.write_all(&(padded_header.len() as u32).to_le_bytes())?;
    }
    writer.write_all(padded_header.as_bytes())?;
    writer.write_all(&data)?;
    debug_assert_eq!((prefix_len + padded_header.len()) % 64, 0);
    debug!(dtype = %tensor.dtype(), shape = ?tensor.shape(), version = major, "wrote npy array");
    Ok(())
}

fn read_exact_or_format<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            TensorIoError::format(format!("npy stream ended inside the {what}"))
        }
        _ => TensorIoError::Stream(e),
    })
}

/// Read one array from an `.npy` stream.
pub fn read<R: Read>(reader: &mut R) -> Result<Tensor> {
    let mut magic = [0u8; 6];
    read_exact_or_format(reader, &mut magic, "magic")?;
    if &magic != NUMPY_MAGIC {
        return Err(TensorIoError::format(format!(
            "invalid npy magic {magic:02x?} (expected \\x93NUMPY)"
        )));
    }

    let mut version = [0u8; 2];
    read_exact_or_format(reader, &mut version, "version")?;
    let header_len = match version[0] {
        1 => {
            let mut buf = [0u8; 2];
            read_exact_or_format(reader, &mut buf, "header length")?;
            u16::from_le_bytes(buf) as usize
        }
        2 | 3 => {
            let mut buf = [0u8; 4];
            read_exact_or_format(reader, &mut buf, "header length")?;
            u32::from_le_bytes(buf) as usize
        }
        _ => {
            return Err(TensorIoError::format(format!(
                "unsupported npy version: {}.{}",
                version[0], version[1]
            )));
        }
    };

    let mut header_bytes = Vec::new();
    reader.by_ref().take(header_len as u64).read_to_end(&mut header_bytes)?;
    if header_bytes.len() != header_len {
        return Err(TensorIoError::format("npy stream ended inside the header"));
    }
    let header_str = std::str::from_utf8(&header_bytes)
        .map_err(|e| TensorIoError::format(format!("invalid npy header UTF-8: {e}")))?
        .trim();
    let header = parse_header(header_str)?;

    let expected = header
        .shape
        .iter()
        .try_fold(header.dtype.size(), |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| TensorIoError::format(format!("npy shape {:?} overflows", header.shape)))?;
    let mut data = Vec::new();
    reader.by_ref().take(expected as u64).read_to_end(&mut data)?;
    if data.len() != expected {
        return Err(TensorIoError::format(format!(
            "npy payload has {} bytes, shape {:?} of {} needs {expected}",
            data.len(),
            header.shape,
            header.dtype
        )));
    }

    if header.swap_bytes {
        // complex64 is two f32 halves, each swapped on its own
        let width = if header.dtype == DType::C64 { 4 } else { header.dtype.size() };
        data.chunks_exact_mut(width).for_each(<[u8]>::reverse);
    }

    debug!(dtype = %header.dtype, shape = ?header.shape, "read npy array");
    Tensor::from_bytes(header.dtype, header.shape, data)
}
