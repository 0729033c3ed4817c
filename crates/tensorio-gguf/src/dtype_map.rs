//! Host dtype <-> GGML tensor type mapping
//!
//! The mapping is partial in both directions. Codes the reader recognises but
//! cannot copy verbatim (quantized blocks, I64, F64, BF16) map to `None`; the
//! reader decides what to do with them.

use crate::GgmlType;
use tensorio_common::DType;

/// GGML tensor type a host dtype is written as, if any.
pub const fn to_file_code(dtype: DType) -> Option<GgmlType> {
    match dtype {
        DType::F32 => Some(GgmlType::F32),
        DType::F16 => Some(GgmlType::F16),
        DType::I8 => Some(GgmlType::I8),
        DType::I16 => Some(GgmlType::I16),
        DType::I32 => Some(GgmlType::I32),
        _ => None,
    }
}

/// Host dtype whose bytes are identical to the GGML payload, if any.
pub const fn from_file_code(ty: GgmlType) -> Option<DType> {
    match ty {
        GgmlType::F32 => Some(DType::F32),
        GgmlType::F16 => Some(DType::F16),
        GgmlType::I8 => Some(DType::I8),
        GgmlType::I16 => Some(DType::I16),
        GgmlType::I32 => Some(DType::I32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_dtypes_round_trip() {
        for dtype in DType::ALL {
            if let Some(code) = to_file_code(dtype) {
                assert_eq!(from_file_code(code), Some(dtype));
            }
        }
    }

    #[test]
    fn outbound_table_is_exact() {
        let mapped: Vec<DType> =
            DType::ALL.into_iter().filter(|&d| to_file_code(d).is_some()).collect();
        assert_eq!(mapped, vec![DType::I8, DType::I16, DType::I32, DType::F16, DType::F32]);
    }

    #[test]
    fn recognised_codes_are_not_coerced() {
        for ty in [GgmlType::I64, GgmlType::F64, GgmlType::BF16, GgmlType::Q8_0, GgmlType::Q4_K] {
            assert_eq!(from_file_code(ty), None, "{ty} must not map to a host dtype");
        }
    }
}
