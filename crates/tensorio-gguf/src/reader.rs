//! GGUF load pipeline
//!
//! Header, then metadata records, then the tensor index, then one payload per
//! descriptor. Every payload is dispatched to exactly one decoder:
//!
//! 1. quantized `.weight` tensors in a known scheme -> [`quant::extract`]
//! 2. types with a host equivalent -> verbatim byte copy
//! 3. anything else -> [`dequant::dequantize`] (F16)

use crate::context::{ContainerContext, TensorInfo};
use crate::metadata::MetadataValue;
use crate::{ALIGNMENT_KEY, dequant, dtype_map, quant};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tensorio_common::{CodecConfig, DType, Result, Tensor, TensorIoError};
use tracing::{debug, info, warn};

pub type TensorMap = HashMap<String, Tensor>;
pub type MetadataMap = HashMap<String, MetadataValue>;

/// Apply a `general.alignment` record to the context.
fn apply_alignment(ctx: &mut ContainerContext, value: &MetadataValue) -> Result<()> {
    let alignment = match value {
        MetadataValue::Scalar(t) if t.dtype() == DType::U32 => value.as_u64(),
        _ => None,
    }
    .ok_or_else(|| TensorIoError::format(format!("`{ALIGNMENT_KEY}` must be a u32 scalar")))?;
    ctx.set_alignment(alignment as usize)
}

/// Decode every metadata record. Later duplicates of a key replace earlier ones.
pub fn read_metadata_section(ctx: &mut ContainerContext) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::new();
    while let Some(key) = ctx.next_key()? {
        let value = ctx.read_value()?;
        if key == ALIGNMENT_KEY {
            apply_alignment(ctx, &value)?;
        }
        debug!(key = %key, "read metadata");
        if metadata.insert(key.clone(), value).is_some() {
            debug!(key = %key, "duplicate metadata key, keeping the last value");
        }
    }
    Ok(metadata)
}

fn insert_unique(tensors: &mut TensorMap, name: String, tensor: Tensor) -> Result<()> {
    if tensors.contains_key(&name) {
        return Err(TensorIoError::format(format!("duplicate tensor name `{name}`")));
    }
    tensors.insert(name, tensor);
    Ok(())
}

fn read_descriptors(ctx: &mut ContainerContext) -> Result<Vec<TensorInfo>> {
    let mut infos = Vec::new();
    while let Some(info) = ctx.next_tensor_info()? {
        infos.push(info);
    }
    Ok(infos)
}

/// Decode every tensor. Must follow [`read_metadata_section`].
pub fn read_tensor_section(ctx: &mut ContainerContext) -> Result<TensorMap> {
    let infos = read_descriptors(ctx)?;
    let mut tensors = TensorMap::with_capacity(infos.len());

    for info in &infos {
        let name = info.name.as_str();
        let scheme = quant::scheme_for(info.ggml_type).filter(|_| quant::is_weight_name(name));
        if let Some(scheme) = scheme {
            quant::check_shape(name, scheme, &info.shape)?;
        }
        let payload = ctx.tensor_data(info)?;

        if let Some(scheme) = scheme {
            let parts = quant::extract(name, scheme, &info.shape, payload)?;
            let Some((scales, biases)) = quant::derived_names(name) else {
                return Err(TensorIoError::format(format!("`{name}` has no `.weight` prefix")));
            };
            insert_unique(&mut tensors, info.name.clone(), parts.weights)?;
            insert_unique(&mut tensors, scales, parts.scales)?;
            insert_unique(&mut tensors, biases, parts.biases)?;
        } else if let Some(dtype) = dtype_map::from_file_code(info.ggml_type) {
            debug!(tensor = name, %dtype, shape = ?info.shape, "copied tensor");
            let tensor = Tensor::from_bytes(dtype, info.shape.clone(), payload.to_vec())?;
            insert_unique(&mut tensors, info.name.clone(), tensor)?;
        } else {
            warn!(
                tensor = name,
                ggml_type = %info.ggml_type,
                "no host equivalent, widening to float16"
            );
            let tensor = dequant::dequantize(name, info.ggml_type, &info.shape, payload)?;
            insert_unique(&mut tensors, info.name.clone(), tensor)?;
        }
    }
    Ok(tensors)
}

/// Load every tensor and metadata record from `path`.
pub fn load_gguf(path: impl AsRef<Path>) -> Result<(TensorMap, MetadataMap)> {
    load_gguf_with_config(path, &CodecConfig::from_env())
}

pub fn load_gguf_with_config(
    path: impl AsRef<Path>,
    config: &CodecConfig,
) -> Result<(TensorMap, MetadataMap)> {
    let path = path.as_ref();
    let mut ctx = ContainerContext::open(path, config)?;
    let metadata = read_metadata_section(&mut ctx)?;
    let tensors = read_tensor_section(&mut ctx)?;
    ctx.close()?;
    info!(
        path = %path.display(),
        tensors = tensors.len(),
        metadata = metadata.len(),
        "loaded GGUF file"
    );
    Ok((tensors, metadata))
}

/// Header, metadata and tensor index of a GGUF file, without tensor bytes.
#[derive(Debug, Clone)]
pub struct GgufSummary {
    pub version: u32,
    pub alignment: usize,
    /// Absolute file offset of the data section.
    pub data_start: usize,
    pub metadata: BTreeMap<String, MetadataValue>,
    pub tensors: Vec<TensorInfo>,
}

pub fn inspect_gguf(path: impl AsRef<Path>) -> Result<GgufSummary> {
    let path = path.as_ref();
    let mut ctx = ContainerContext::open(path, &CodecConfig::from_env())?;
    let metadata = read_metadata_section(&mut ctx)?.into_iter().collect();
    let tensors = read_descriptors(&mut ctx)?;
    for info in &tensors {
        // bounds and alignment only
        ctx.tensor_data(info)?;
    }
    let summary = GgufSummary {
        version: ctx.version(),
        alignment: ctx.alignment(),
        data_start: ctx.data_start()?,
        metadata,
        tensors,
    };
    ctx.close()?;
    Ok(summary)
}
