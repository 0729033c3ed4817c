//! CLI command implementations

pub mod convert;
pub mod inspect;

pub use convert::ConvertCommand;
pub use inspect::InspectCommand;

use anyhow::{Context, Result};
use std::path::Path;
use tensorio_formats::{FileFormat, MetadataMap, MetadataValue, TensorMap};

use crate::config::CliConfig;

/// Detect the format of `path` from its extension.
pub fn format_of(path: &Path) -> Result<FileFormat> {
    FileFormat::from_path(path).with_context(|| {
        format!(
            "cannot tell the format of {} (expected .npy, .safetensors or .gguf)",
            path.display()
        )
    })
}

/// Tensors and metadata from any supported file. `.npy` yields a single
/// tensor named after the file stem; `.safetensors` strings become string
/// metadata values.
pub fn load_any(path: &Path, config: &CliConfig) -> Result<(TensorMap, MetadataMap)> {
    let loaded = match format_of(path)? {
        FileFormat::Npy => {
            let tensor = tensorio_formats::load(path)?;
            let name = path.file_stem().map_or_else(
                || "array".to_string(),
                |stem| stem.to_string_lossy().into_owned(),
            );
            (TensorMap::from([(name, tensor)]), MetadataMap::new())
        }
        FileFormat::SafeTensors => {
            let (tensors, strings) = tensorio_formats::load_map_with_metadata(path)?;
            let metadata =
                strings.into_iter().map(|(k, v)| (k, MetadataValue::String(v))).collect();
            (tensors, metadata)
        }
        FileFormat::Gguf => tensorio_formats::load_gguf_with_config(path, &config.codec)?,
    };
    Ok(loaded)
}
