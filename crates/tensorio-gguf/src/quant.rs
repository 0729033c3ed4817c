//! Block-quantized weight extraction
//!
//! Third-party GGUF files store most weights in GGML block formats. For the
//! schemes listed in [`SCHEMES`] the reader does not widen the data; it
//! unpacks each block into
//!
//! * a packed-weight `U32` tensor of unsigned codes (`bits` per weight,
//!   weight `2k` in the low nibble of byte `k` for 4-bit schemes),
//! * an `F16` scale per block,
//! * an `F16` bias per block, so that `w = scale * code + bias`.
//!
//! Only tensors whose name ends in `.weight` take this path. Their scales and
//! biases are published as `<prefix>.scales` and `<prefix>.biases`.

use crate::{GgmlType, WEIGHT_SUFFIX};
use half::f16;
use tensorio_common::{DType, Result, Tensor, TensorIoError};
use tracing::debug;

/// Weights per block for every scheme in [`SCHEMES`].
pub const GROUP_SIZE: usize = 32;

/// Where the per-block bias comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BiasSource {
    /// Stored as an f16 right after the scale.
    Explicit,
    /// `multiplier * scale`.
    Derived(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizationScheme {
    pub ggml_type: GgmlType,
    pub weights_per_block: usize,
    pub bytes_per_block: usize,
    pub bits_per_weight: usize,
    pub bias: BiasSource,
}

impl QuantizationScheme {
    /// Bytes in front of the packed codes.
    const fn header_len(&self) -> usize {
        match self.bias {
            BiasSource::Explicit => 4,
            BiasSource::Derived(_) => 2,
        }
    }

    /// Packed output bytes per block.
    const fn packed_len(&self) -> usize {
        self.weights_per_block * self.bits_per_weight / 8
    }
}

pub const SCHEMES: [QuantizationScheme; 3] = [
    // x = d * (q - 8)
    QuantizationScheme {
        ggml_type: GgmlType::Q4_0,
        weights_per_block: GROUP_SIZE,
        bytes_per_block: 18,
        bits_per_weight: 4,
        bias: BiasSource::Derived(-8.0),
    },
    // x = d * q + m
    QuantizationScheme {
        ggml_type: GgmlType::Q4_1,
        weights_per_block: GROUP_SIZE,
        bytes_per_block: 20,
        bits_per_weight: 4,
        bias: BiasSource::Explicit,
    },
    // x = d * q, q signed
    QuantizationScheme {
        ggml_type: GgmlType::Q8_0,
        weights_per_block: GROUP_SIZE,
        bytes_per_block: 34,
        bits_per_weight: 8,
        bias: BiasSource::Derived(-128.0),
    },
];

pub fn scheme_for(ty: GgmlType) -> Option<&'static QuantizationScheme> {
    SCHEMES.iter().find(|s| s.ggml_type == ty)
}

pub fn is_weight_name(name: &str) -> bool {
    name.len() > WEIGHT_SUFFIX.len() && name.ends_with(WEIGHT_SUFFIX)
}

/// `(P.scales, P.biases)` for a tensor named `P.weight`.
pub fn derived_names(name: &str) -> Option<(String, String)> {
    let prefix = name.strip_suffix(WEIGHT_SUFFIX)?;
    Some((format!("{prefix}.scales"), format!("{prefix}.biases")))
}

// ---------------------------------------------------------------------------
// Bounds-checked accessors
// ---------------------------------------------------------------------------

/// Bytes of block `index` in a run of fixed-size blocks.
pub fn block_bytes(payload: &[u8], index: usize, block_len: usize) -> Result<&[u8]> {
    let start = index.checked_mul(block_len);
    start
        .and_then(|s| payload.get(s..s.checked_add(block_len)?))
        .ok_or_else(|| {
            TensorIoError::format(format!(
                "block {index} of {block_len} bytes lies outside a {}-byte payload",
                payload.len()
            ))
        })
}

/// Little-endian f16 at `offset`.
pub fn read_f16(bytes: &[u8], offset: usize) -> Result<f16> {
    match bytes.get(offset..offset + 2) {
        Some(b) => Ok(f16::from_le_bytes([b[0], b[1]])),
        None => Err(TensorIoError::format(format!(
            "f16 at offset {offset} lies outside a {}-byte block",
            bytes.len()
        ))),
    }
}

/// Weight `index` of a GGML 4-bit run of `qs.len()` bytes: byte `j` holds
/// weight `j` in its low nibble and weight `j + qs.len()` in its high nibble.
pub fn read_nibble(qs: &[u8], index: usize) -> Result<u8> {
    let half = qs.len();
    let byte = qs.get(index % half.max(1)).filter(|_| index < 2 * half).ok_or_else(|| {
        TensorIoError::format(format!("nibble {index} lies outside {half} packed bytes"))
    })?;
    Ok(if index < half { byte & 0x0F } else { byte >> 4 })
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedParts {
    pub weights: Tensor,
    pub scales: Tensor,
    pub biases: Tensor,
}

/// Unpack a quantized payload whose host-order shape is `shape`.
/// Last host dimension of `shape`, which must be a whole number of blocks.
pub fn check_shape(name: &str, scheme: &QuantizationScheme, shape: &[usize]) -> Result<usize> {
    let group = scheme.weights_per_block;
    match shape.last() {
        Some(&last) if last % group == 0 => Ok(last),
        Some(&last) => Err(TensorIoError::Shape { name: name.to_owned(), dim: last, block: group }),
        None => Err(TensorIoError::Shape { name: name.to_owned(), dim: 1, block: group }),
    }
}

pub fn extract(
    name: &str,
    scheme: &QuantizationScheme,
    shape: &[usize],
    payload: &[u8],
) -> Result<QuantizedParts> {
    let group = scheme.weights_per_block;
    let last = check_shape(name, scheme, shape)?;

    let numel: usize = shape.iter().product();
    let n_blocks = numel / group;
    let needed = n_blocks * scheme.bytes_per_block;
    if payload.len() < needed {
        return Err(TensorIoError::format(format!(
            "`{name}`: {} payload has {} bytes, {n_blocks} blocks need {needed}",
            scheme.ggml_type,
            payload.len()
        )));
    }

    let packed_len = scheme.packed_len();
    let mut packed = Vec::with_capacity(n_blocks * packed_len);
    let mut scales = Vec::with_capacity(n_blocks * 2);
    let mut biases = Vec::with_capacity(n_blocks * 2);

    for b in 0..n_blocks {
        let block = block_bytes(payload, b, scheme.bytes_per_block)?;
        let scale = read_f16(block, 0)?;
        let bias = match scheme.bias {
            BiasSource::Explicit => read_f16(block, 2)?,
            BiasSource::Derived(mult) => f16::from_f32(mult * scale.to_f32()),
        };
        scales.extend_from_slice(&scale.to_le_bytes());
        biases.extend_from_slice(&bias.to_le_bytes());

        let qs = &block[scheme.header_len()..];
        match scheme.bits_per_weight {
            4 => {
                for k in 0..packed_len {
                    let lo = read_nibble(qs, 2 * k)?;
                    let hi = read_nibble(qs, 2 * k + 1)?;
                    packed.push(lo | (hi << 4));
                }
            }
            8 => packed.extend(qs.iter().map(|&q| q ^ 0x80)),
            bits => {
                return Err(TensorIoError::format(format!(
                    "`{name}`: {bits}-bit extraction is not implemented"
                )));
            }
        }
    }

    let mut weights_shape = shape.to_vec();
    let mut group_shape = shape.to_vec();
    if let (Some(w), Some(g)) = (weights_shape.last_mut(), group_shape.last_mut()) {
        *w = last * scheme.bits_per_weight / 32;
        *g = last / group;
    }

    debug!(
        tensor = name,
        scheme = %scheme.ggml_type,
        blocks = n_blocks,
        "extracted quantized weight"
    );

    Ok(QuantizedParts {
        weights: Tensor::from_bytes(DType::U32, weights_shape, packed)?,
        scales: Tensor::from_bytes(DType::F16, group_shape.clone(), scales)?,
        biases: Tensor::from_bytes(DType::F16, group_shape, biases)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f16s(t: &Tensor) -> Vec<f32> {
        t.to_vec::<f16>().unwrap().into_iter().map(f16::to_f32).collect()
    }

    #[test]
    fn scheme_table() {
        assert_eq!(scheme_for(GgmlType::Q4_0).unwrap().bytes_per_block, 18);
        assert_eq!(scheme_for(GgmlType::Q4_1).unwrap().bias, BiasSource::Explicit);
        assert_eq!(scheme_for(GgmlType::Q8_0).unwrap().bits_per_weight, 8);
        assert!(scheme_for(GgmlType::Q4_K).is_none());
        assert!(scheme_for(GgmlType::F16).is_none());
        for s in &SCHEMES {
            assert_eq!(s.ggml_type.type_size(), s.bytes_per_block);
            assert_eq!(s.ggml_type.block_size(), s.weights_per_block);
        }
    }

    #[test]
    fn derived_names_strip_weight_suffix() {
        assert_eq!(
            derived_names("blk.0.attn_q.weight"),
            Some(("blk.0.attn_q.scales".into(), "blk.0.attn_q.biases".into()))
        );
        assert_eq!(derived_names("blk.0.attn_q.bias"), None);
        assert!(is_weight_name("token_embd.weight"));
        assert!(!is_weight_name("weights"));
        assert!(!is_weight_name(".weight"));
    }

    #[test]
    fn q8_0_literal_block() {
        // d = 0.5, q = -16..16
        let mut block = f16::from_f32(0.5).to_le_bytes().to_vec();
        block.extend((-16i8..16).map(|q| q as u8));

        let scheme = scheme_for(GgmlType::Q8_0).unwrap();
        let parts = extract("w.weight", scheme, &[32], &block).unwrap();
        assert_eq!(parts.weights.dtype(), DType::U32);
        assert_eq!(parts.weights.shape(), &[8]);
        let expected: Vec<u8> = (112u8..144).collect();
        assert_eq!(parts.weights.data(), expected.as_slice());
        assert_eq!(parts.scales.shape(), &[1]);
        assert_eq!(f16s(&parts.scales), vec![0.5]);
        assert_eq!(f16s(&parts.biases), vec![-64.0]);

        // scale * code + bias reproduces the signed value
        for (i, &code) in parts.weights.data().iter().enumerate() {
            assert_eq!(0.5 * f32::from(code) - 64.0, 0.5 * (i as f32 - 16.0));
        }
    }

    fn q4_block(header: &[u8]) -> Vec<u8> {
        // w[j] = j, w[j + 16] = 15 - j
        let mut block = header.to_vec();
        block.extend((0u8..16).map(|j| j | ((15 - j) << 4)));
        block
    }

    const Q4_REPACKED: [u8; 16] = [
        0x10, 0x32, 0x54, 0x76, 0x98, 0xBA, 0xDC, 0xFE, 0xEF, 0xCD, 0xAB, 0x89, 0x67, 0x45, 0x23,
        0x01,
    ];

    #[test]
    fn q4_1_literal_block() {
        let mut header = f16::from_f32(0.25).to_le_bytes().to_vec();
        header.extend_from_slice(&f16::from_f32(-1.0).to_le_bytes());
        let block = q4_block(&header);

        let scheme = scheme_for(GgmlType::Q4_1).unwrap();
        let parts = extract("w.weight", scheme, &[32], &block).unwrap();
        assert_eq!(parts.weights.shape(), &[4]);
        assert_eq!(parts.weights.data(), &Q4_REPACKED);
        assert_eq!(f16s(&parts.scales), vec![0.25]);
        assert_eq!(f16s(&parts.biases), vec![-1.0]);
    }

    #[test]
    fn q4_0_literal_block() {
        let block = q4_block(&f16::from_f32(2.0).to_le_bytes());

        let scheme = scheme_for(GgmlType::Q4_0).unwrap();
        let parts = extract("w.weight", scheme, &[32], &block).unwrap();
        assert_eq!(parts.weights.data(), &Q4_REPACKED);
        assert_eq!(f16s(&parts.scales), vec![2.0]);
        assert_eq!(f16s(&parts.biases), vec![-16.0]);
    }

    #[test]
    fn multi_row_shapes() {
        let scheme = scheme_for(GgmlType::Q8_0).unwrap();
        let mut payload = Vec::new();
        for _ in 0..6 {
            payload.extend_from_slice(&f16::from_f32(1.0).to_le_bytes());
            payload.extend_from_slice(&[0u8; 32]);
        }
        let parts = extract("w.weight", scheme, &[3, 64], &payload).unwrap();
        assert_eq!(parts.weights.shape(), &[3, 16]);
        assert_eq!(parts.scales.shape(), &[3, 2]);
        assert_eq!(parts.biases.shape(), &[3, 2]);
        assert!(parts.weights.data().iter().all(|&b| b == 0x80));
    }

    #[test]
    fn last_dim_must_be_a_block_multiple() {
        let scheme = scheme_for(GgmlType::Q4_0).unwrap();
        let err = extract("w.weight", scheme, &[2, 48], &[0u8; 54]).unwrap_err();
        assert!(matches!(err, TensorIoError::Shape { dim: 48, block: 32, .. }));
    }

    #[test]
    fn short_payload_is_a_format_error() {
        let scheme = scheme_for(GgmlType::Q4_1).unwrap();
        let err = extract("w.weight", scheme, &[64], &[0u8; 39]).unwrap_err();
        assert!(matches!(err, TensorIoError::Format(_)));
    }

    #[test]
    fn accessors_are_bounds_checked() {
        assert!(block_bytes(&[0u8; 36], 1, 18).is_ok());
        assert!(block_bytes(&[0u8; 36], 2, 18).is_err());
        assert!(block_bytes(&[0u8; 4], usize::MAX, 2).is_err());
        assert!(read_f16(&[0u8; 3], 2).is_err());
        assert_eq!(read_nibble(&[0x21], 0).unwrap(), 1);
        assert_eq!(read_nibble(&[0x21], 1).unwrap(), 2);
        assert!(read_nibble(&[0x21], 2).is_err());
    }
}
