//! GGUF container codec.
//!
//! Reads and writes the three-section GGUF layout (metadata records, tensor
//! index, aligned tensor data) on top of the host [`Tensor`] type.
//!
//! Loading copies plain element types verbatim, unpacks Q4_0/Q4_1/Q8_0
//! `.weight` tensors into packed codes plus per-block scales and biases, and
//! widens every other recognised GGML type to float16. Saving accepts any
//! [`TensorView`] whose dtype has a GGML equivalent.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use tensorio_common::Tensor;
//! use tensorio_gguf::{MetadataMap, MetadataValue, load_gguf, save_gguf};
//!
//! let mut tensors = HashMap::new();
//! tensors.insert("w".to_string(), Tensor::from_slice(&[1.0f32, 2.0], &[2])?);
//! let mut metadata = MetadataMap::new();
//! metadata.insert("general.name".into(), MetadataValue::from("demo"));
//!
//! let path = save_gguf("demo.gguf", &tensors, &metadata)?;
//! let (_tensors, metadata) = load_gguf(&path)?;
//! assert_eq!(metadata["general.name"].as_str(), Some("demo"));
//! # Ok::<(), tensorio_common::TensorIoError>(())
//! ```

pub mod context;
pub mod cursor;
pub mod dequant;
pub mod dtype_map;
pub mod metadata;
pub mod quant;
pub mod reader;
pub mod types;
pub mod writer;

pub use context::{ContainerContext, Mode, Section, TensorInfo};
pub use metadata::MetadataValue;
pub use reader::{
    GgufSummary, MetadataMap, TensorMap, inspect_gguf, load_gguf, load_gguf_with_config,
    read_metadata_section, read_tensor_section,
};
pub use types::{GgmlType, GgufValueType};
pub use writer::{gguf_path, save_gguf, save_gguf_with_config};

#[doc(no_inline)]
pub use tensorio_common::{Tensor, TensorView};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// The four-byte magic that every GGUF file starts with.
pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";
/// Minimum supported GGUF version.
pub const GGUF_VERSION_MIN: u32 = 2;
/// Maximum supported GGUF version (inclusive).
pub const GGUF_VERSION_MAX: u32 = 3;

/// Metadata key that overrides the tensor-data alignment.
pub const ALIGNMENT_KEY: &str = "general.alignment";

/// Suffix that marks a tensor as eligible for quantized-weight extraction.
pub const WEIGHT_SUFFIX: &str = ".weight";

/// Returns `true` if `data` starts with the GGUF magic bytes.
#[inline]
pub fn check_magic(data: &[u8]) -> bool {
    data.get(0..4) == Some(&GGUF_MAGIC[..])
}

/// Read the GGUF version field from the first 8 bytes.
///
/// Returns `None` if the slice is too short or the magic is invalid.
pub fn read_version(data: &[u8]) -> Option<u32> {
    if data.len() < 8 || !check_magic(data) {
        return None;
    }
    Some(u32::from_le_bytes([data[4], data[5], data[6], data[7]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_and_version() {
        let mut data = GGUF_MAGIC.to_vec();
        data.extend_from_slice(&3u32.to_le_bytes());
        assert!(check_magic(&data));
        assert_eq!(read_version(&data), Some(3));
        assert!(!check_magic(b"GGU"));
        assert_eq!(read_version(b"GGML\x03\x00\x00\x00"), None);
    }
}
