//! Load and save tensors in `.npy`, `.safetensors` and GGUF files.
//!
//! | format | single array | named map | metadata |
//! |---|---|---|---|
//! | `.npy` | [`load`] / [`save`] | | |
//! | `.safetensors` | | [`load_map`] / [`save_map`] | string table |
//! | GGUF | | [`load_gguf`] / [`save_gguf`] | typed values |
//!
//! Every save entry point takes any [`TensorView`], forcing evaluation and a
//! row-major copy when the view is not already contiguous. Path-based saves
//! append the format's extension when the path lacks it and return the path
//! actually written.

pub mod formats;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub use formats::npy;
pub use formats::safetensors::{self as st, StringMetadata};
pub use tensorio_common::{CodecConfig, DType, Result, Tensor, TensorIoError, TensorView};
pub use tensorio_gguf::{
    GgufSummary, MetadataMap, MetadataValue, TensorMap, inspect_gguf, load_gguf,
    load_gguf_with_config, save_gguf, save_gguf_with_config,
};

/// On-disk formats, identified by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Npy,
    SafeTensors,
    Gguf,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "npy" => Some(Self::Npy),
            "safetensors" => Some(Self::SafeTensors),
            "gguf" => Some(Self::Gguf),
            _ => None,
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            Self::Npy => "npy",
            Self::SafeTensors => "safetensors",
            Self::Gguf => "gguf",
        }
    }

    /// `path` with this format's extension appended when it has another one.
    /// The comparison ignores ASCII case, matching [`from_path`](Self::from_path).
    pub fn normalize_path(self, path: &Path) -> PathBuf {
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case(self.extension())) {
            return path.to_path_buf();
        }
        let mut s = path.as_os_str().to_owned();
        s.push(".");
        s.push(self.extension());
        PathBuf::from(s)
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| TensorIoError::io(path, e))
}

fn create(path: &Path) -> Result<File> {
    File::create(path).map_err(|e| TensorIoError::io(path, e))
}

// ---------------------------------------------------------------------------
// Single array (.npy)
// ---------------------------------------------------------------------------

pub fn load(path: impl AsRef<Path>) -> Result<Tensor> {
    let path = path.as_ref();
    let tensor = npy::read(&mut BufReader::new(open(path)?))?;
    info!(
        path = %path.display(),
        dtype = %tensor.dtype(),
        shape = ?tensor.shape(),
        "loaded npy file"
    );
    Ok(tensor)
}

pub fn load_from_reader<R: Read>(mut reader: R) -> Result<Tensor> {
    npy::read(&mut reader)
}

pub fn save<T: TensorView + ?Sized>(path: impl AsRef<Path>, tensor: &T) -> Result<PathBuf> {
    let path = FileFormat::Npy.normalize_path(path.as_ref());
    // encode first so a rejected tensor leaves any existing file untouched
    let mut buf = Vec::with_capacity(tensor.nbytes() + 128);
    npy::write(&mut buf, tensor)?;
    let mut writer = BufWriter::new(create(&path)?);
    writer.write_all(&buf).and_then(|()| writer.flush()).map_err(|e| TensorIoError::io(&path, e))?;
    info!(
        path = %path.display(),
        dtype = %tensor.dtype(),
        shape = ?tensor.shape(),
        "saved npy file"
    );
    Ok(path)
}

pub fn save_to_writer<W: Write, T: TensorView + ?Sized>(mut writer: W, tensor: &T) -> Result<()> {
    npy::write(&mut writer, tensor)?;
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Named map (.safetensors)
// ---------------------------------------------------------------------------

pub fn load_map(path: impl AsRef<Path>) -> Result<TensorMap> {
    Ok(load_map_with_metadata(path)?.0)
}

/// Tensors plus the file's `__metadata__` table.
pub fn load_map_with_metadata(path: impl AsRef<Path>) -> Result<(TensorMap, StringMetadata)> {
    let path = path.as_ref();
    let file = open(path)?;
    // SAFETY: the mapping is read-only and every tensor is copied out before it is dropped.
    let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| TensorIoError::io(path, e))?;
    let (tensors, metadata) = st::decode(&mmap)?;
    info!(path = %path.display(), tensors = tensors.len(), "loaded safetensors file");
    Ok((tensors, metadata))
}

pub fn load_map_from_reader<R: Read>(mut reader: R) -> Result<TensorMap> {
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;
    Ok(st::decode(&buffer)?.0)
}

pub fn save_map<T: TensorView>(
    path: impl AsRef<Path>,
    tensors: &HashMap<String, T>,
) -> Result<PathBuf> {
    save_map_with_metadata(path, tensors, &StringMetadata::new())
}

pub fn save_map_with_metadata<T: TensorView>(
    path: impl AsRef<Path>,
    tensors: &HashMap<String, T>,
    metadata: &StringMetadata,
) -> Result<PathBuf> {
    let path = FileFormat::SafeTensors.normalize_path(path.as_ref());
    st::encode_to_file(&path, tensors, metadata)?;
    info!(path = %path.display(), tensors = tensors.len(), "saved safetensors file");
    Ok(path)
}

pub fn save_map_to_writer<W: Write, T: TensorView>(
    mut writer: W,
    tensors: &HashMap<String, T>,
) -> Result<()> {
    let buffer = st::encode(tensors, &StringMetadata::new())?;
    writer.write_all(&buffer)?;
    writer.flush()?;
    Ok(())
}
