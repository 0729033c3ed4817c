//! `tensorio convert`: re-encode a file into another format.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tensorio_formats::{FileFormat, MetadataMap, StringMetadata, TensorMap};
use tracing::{info, warn};

use super::{format_of, load_any};
use crate::config::CliConfig;
use crate::render::metadata_text;

#[derive(Args, Debug)]
pub struct ConvertCommand {
    /// Source file (.npy, .safetensors or .gguf)
    #[arg(short, long, value_name = "IN")]
    pub input: PathBuf,

    /// Destination file; its extension selects the output format
    #[arg(short, long, value_name = "OUT")]
    pub output: PathBuf,
}

impl ConvertCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let written = convert(&self.input, &self.output, config)?;
        println!("{}", written.display());
        Ok(())
    }
}

/// Convert `input` to the format implied by `output`'s extension and return
/// the path written.
pub fn convert(input: &Path, output: &Path, config: &CliConfig) -> Result<PathBuf> {
    let target = format_of(output)?;
    let (tensors, metadata) =
        load_any(input, config).with_context(|| format!("failed to read {}", input.display()))?;

    let written = match target {
        FileFormat::Npy => {
            let tensor = single_tensor(&tensors, input)?;
            if !metadata.is_empty() {
                warn!(dropped = metadata.len(), "npy files carry no metadata");
            }
            tensorio_formats::save(output, tensor)?
        }
        FileFormat::SafeTensors => {
            let strings = string_metadata(&metadata)?;
            tensorio_formats::save_map_with_metadata(output, &tensors, &strings)?
        }
        FileFormat::Gguf => {
            tensorio_formats::save_gguf_with_config(output, &tensors, &metadata, &config.codec)?
        }
    };
    info!(
        input = %input.display(),
        output = %written.display(),
        tensors = tensors.len(),
        "converted"
    );
    Ok(written)
}

fn single_tensor<'a>(tensors: &'a TensorMap, input: &Path) -> Result<&'a tensorio_formats::Tensor> {
    let mut iter = tensors.values();
    match (iter.next(), iter.next()) {
        (Some(tensor), None) => Ok(tensor),
        _ => anyhow::bail!(
            "{} holds {} tensors; .npy output needs exactly one",
            input.display(),
            tensors.len()
        ),
    }
}

fn string_metadata(metadata: &MetadataMap) -> Result<StringMetadata> {
    metadata
        .iter()
        .map(|(key, value)| Ok((key.clone(), metadata_text(value)?)))
        .collect()
}
