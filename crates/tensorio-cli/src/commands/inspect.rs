//! `tensorio inspect`: list what a file holds without converting it.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tensorio_formats::{FileFormat, inspect_gguf};
use tracing::debug;

use super::{format_of, load_any};
use crate::config::CliConfig;
use crate::render::metadata_json;

#[derive(Args, Debug)]
pub struct InspectCommand {
    /// File to inspect (.npy, .safetensors or .gguf)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct GgufHeader {
    pub version: u32,
    pub alignment: usize,
    pub data_start: usize,
}

#[derive(Debug, Serialize)]
pub struct TensorEntry {
    pub name: String,
    /// Host dtype, or the GGML type for GGUF descriptors.
    pub dtype: String,
    pub shape: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub path: PathBuf,
    pub format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<GgufHeader>,
    pub metadata: BTreeMap<String, Value>,
    pub tensors: Vec<TensorEntry>,
}

impl InspectCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let report = Self::report(&self.file, config)?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_text(&report);
        }
        Ok(())
    }

    pub fn report(path: &Path, config: &CliConfig) -> Result<InspectReport> {
        let format = format_of(path)?;
        debug!(path = %path.display(), ?format, "inspecting");
        let mut report = InspectReport {
            path: path.to_path_buf(),
            format: format.extension(),
            header: None,
            metadata: BTreeMap::new(),
            tensors: Vec::new(),
        };

        if format == FileFormat::Gguf {
            let summary = inspect_gguf(path)
                .with_context(|| format!("failed to inspect {}", path.display()))?;
            report.header = Some(GgufHeader {
                version: summary.version,
                alignment: summary.alignment,
                data_start: summary.data_start,
            });
            for (key, value) in &summary.metadata {
                report.metadata.insert(key.clone(), metadata_json(value)?);
            }
            report.tensors = summary
                .tensors
                .into_iter()
                .map(|info| TensorEntry {
                    dtype: info.ggml_type.to_string(),
                    name: info.name,
                    shape: info.shape,
                    offset: Some(info.offset),
                })
                .collect();
            return Ok(report);
        }

        let (tensors, metadata) = load_any(path, config)
            .with_context(|| format!("failed to read {}", path.display()))?;
        for (key, value) in &metadata {
            report.metadata.insert(key.clone(), metadata_json(value)?);
        }
        report.tensors = tensors
            .iter()
            .map(|(name, t)| TensorEntry {
                name: name.clone(),
                dtype: t.dtype().to_string(),
                shape: t.shape().to_vec(),
                offset: None,
            })
            .collect();
        report.tensors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(report)
    }
}

fn print_text(report: &InspectReport) {
    println!("{} ({})", style(report.path.display()).bold(), report.format);
    if let Some(h) = &report.header {
        println!(
            "  version: {}  alignment: {}  data start: {}",
            h.version, h.alignment, h.data_start
        );
    }

    if !report.metadata.is_empty() {
        println!();
        println!("{}", style(format!("Metadata ({})", report.metadata.len())).bold().cyan());
        for (key, value) in &report.metadata {
            println!("  {key:<40} {value}");
        }
    }

    println!();
    println!("{}", style(format!("Tensors ({})", report.tensors.len())).bold().cyan());
    for t in &report.tensors {
        let shape = format!("{:?}", t.shape);
        match t.offset {
            Some(offset) => println!("  {:<48} {:<8} {:<20} @{offset}", t.name, t.dtype, shape),
            None => println!("  {:<48} {:<8} {shape}", t.name, t.dtype),
        }
    }
}
