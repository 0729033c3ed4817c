//! Stateful cursor over one GGUF file
//!
//! A [`ContainerContext`] is opened for reading (memory-mapped) or created for
//! writing (buffered file). It owns the byte cursor, the data alignment and
//! the section the cursor is in. Sections only move forward:
//!
//! ```text
//! Metadata -> Descriptors -> Data
//! ```
//!
//! A created file that is dropped without [`ContainerContext::close`] is
//! removed from disk.

use crate::cursor::ByteCursor;
use crate::metadata::{self, MetadataValue};
use crate::{GGUF_MAGIC, GGUF_VERSION_MAX, GGUF_VERSION_MIN, GgmlType, GgufValueType};
use memmap2::Mmap;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tensorio_common::{CodecConfig, DEFAULT_ALIGNMENT, Result, TensorIoError, align_up};
use tracing::{debug, warn};

/// Fixed header: magic, version, tensor count, kv count.
pub const HEADER_LEN: usize = 24;

/// Most dimensions a descriptor may declare.
pub const MAX_DIMS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Create,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    Metadata,
    Descriptors,
    Data,
}

/// One entry of the tensor index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorInfo {
    pub name: String,
    /// Host order (the file stores the reverse).
    pub shape: Vec<usize>,
    pub ggml_type: GgmlType,
    /// Relative to the start of the data section.
    pub offset: u64,
}

impl TensorInfo {
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Payload size in bytes.
    pub fn byte_size(&self) -> Result<usize> {
        self.ggml_type
            .byte_size(self.numel())
            .map_err(|e| TensorIoError::format(format!("`{}`: {e}", self.name)))
    }
}

enum Handle {
    Mapped(Mmap),
    Created(Option<BufWriter<File>>),
}

pub struct ContainerContext {
    handle: Handle,
    path: PathBuf,
    cursor: usize,
    alignment: usize,
    section: Section,
    version: u32,
    max_string_len: usize,
    n_tensors: u64,
    n_kv: u64,
    // read side: records consumed so far; write side: records appended so far
    kv_done: u64,
    tensors_done: u64,
    pending_value: bool,
    data_start: Option<usize>,
    // write side
    descriptors: Vec<(u64, usize)>,
    payloads_done: usize,
}

impl std::fmt::Debug for ContainerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerContext")
            .field("path", &self.path)
            .field("mode", &self.mode())
            .field("cursor", &self.cursor)
            .field("alignment", &self.alignment)
            .field("section", &self.section)
            .finish_non_exhaustive()
    }
}

impl ContainerContext {
    fn new(handle: Handle, path: &Path, config: &CodecConfig) -> Self {
        Self {
            handle,
            path: path.to_path_buf(),
            cursor: 0,
            alignment: config.alignment,
            section: Section::Metadata,
            version: config.gguf_version,
            max_string_len: config.max_string_len,
            n_tensors: 0,
            n_kv: 0,
            kv_done: 0,
            tensors_done: 0,
            pending_value: false,
            data_start: None,
            descriptors: Vec::new(),
            payloads_done: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Read mode
    // -----------------------------------------------------------------------

    /// Map `path` and validate its header.
    ///
    /// The alignment starts at the GGUF default of 32 whatever `config` says
    /// (its alignment only applies to files being created) and is replaced by
    /// a `general.alignment` record when one is read.
    pub fn open(path: &Path, config: &CodecConfig) -> Result<Self> {
        let file = File::open(path).map_err(|e| TensorIoError::io(path, e))?;
        // SAFETY: the mapping is read-only and every byte is copied out before it is dropped.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| TensorIoError::io(path, e))?;

        let mut ctx = Self::new(Handle::Mapped(mmap), path, config);
        ctx.alignment = DEFAULT_ALIGNMENT;
        let (version, n_tensors, n_kv) = ctx.with_cursor(|c| {
            let magic = c.read_bytes(4)?;
            if magic != GGUF_MAGIC {
                return Err(TensorIoError::format(format!(
                    "invalid GGUF magic {magic:02x?} (expected 'GGUF')"
                )));
            }
            let version = c.read_u32()?;
            if !(GGUF_VERSION_MIN..=GGUF_VERSION_MAX).contains(&version) {
                return Err(TensorIoError::format(format!(
                    "unsupported GGUF version {version} \
                     (supported: {GGUF_VERSION_MIN}-{GGUF_VERSION_MAX})"
                )));
            }
            Ok((version, c.read_u64()?, c.read_u64()?))
        })?;
        ctx.version = version;
        ctx.n_tensors = n_tensors;
        ctx.n_kv = n_kv;
        debug!(path = %path.display(), version, n_tensors, n_kv, "opened GGUF container");
        Ok(ctx)
    }

    fn mapped(&self) -> Result<&[u8]> {
        match &self.handle {
            Handle::Mapped(mmap) => Ok(&mmap[..]),
            Handle::Created(_) => Err(TensorIoError::format("container was created for writing")),
        }
    }

    /// Run `f` over a cursor at the current offset; the offset advances only on success.
    fn with_cursor<R>(&mut self, f: impl FnOnce(&mut ByteCursor<'_>) -> Result<R>) -> Result<R> {
        let data = self.mapped()?;
        let mut c = ByteCursor::new(data, self.cursor, self.max_string_len);
        let out = f(&mut c)?;
        let end = c.offset();
        self.cursor = end;
        Ok(out)
    }

    fn expect_section(&self, section: Section, op: &str) -> Result<()> {
        if self.section != section {
            return Err(TensorIoError::format(format!(
                "{op} called in the {:?} section (expected {section:?})",
                self.section
            )));
        }
        Ok(())
    }

    /// Key of the next metadata record, or `None` once all have been read.
    ///
    /// Every key must be followed by [`read_value`](Self::read_value).
    pub fn next_key(&mut self) -> Result<Option<String>> {
        self.expect_section(Section::Metadata, "next_key")?;
        if self.pending_value {
            return Err(TensorIoError::format("next_key called before the previous value was read"));
        }
        if self.kv_done == self.n_kv {
            self.section = Section::Descriptors;
            return Ok(None);
        }
        let key = self.with_cursor(|c| c.read_string())?;
        self.pending_value = true;
        Ok(Some(key))
    }

    /// Value of the record whose key was just returned by [`next_key`](Self::next_key).
    pub fn read_value(&mut self) -> Result<MetadataValue> {
        self.expect_section(Section::Metadata, "read_value")?;
        if !self.pending_value {
            return Err(TensorIoError::format("read_value called without a preceding key"));
        }
        let value = self.with_cursor(|c| {
            let tag = c.read_u32()?;
            metadata::decode_value(c, tag)
        })?;
        self.pending_value = false;
        self.kv_done += 1;
        Ok(value)
    }

    /// Next tensor descriptor, or `None` once the index is exhausted.
    ///
    /// Exhausting the index fixes the data section start.
    pub fn next_tensor_info(&mut self) -> Result<Option<TensorInfo>> {
        if self.section == Section::Metadata && self.kv_done == self.n_kv && !self.pending_value {
            self.section = Section::Descriptors;
        }
        self.expect_section(Section::Descriptors, "next_tensor_info")?;
        if self.tensors_done == self.n_tensors {
            self.section = Section::Data;
            self.data_start = Some(align_up(self.cursor, self.alignment));
            return Ok(None);
        }

        let info = self.with_cursor(|c| {
            let name = c.read_string()?;
            let n_dims = c.read_u32()? as usize;
            if n_dims > MAX_DIMS {
                return Err(TensorIoError::format(format!(
                    "tensor `{name}` declares {n_dims} dimensions (max {MAX_DIMS})"
                )));
            }
            let mut shape = Vec::with_capacity(n_dims);
            for _ in 0..n_dims {
                let dim = c.read_u64()?;
                shape.push(usize::try_from(dim).map_err(|_| {
                    TensorIoError::format(format!(
                        "tensor `{name}` dimension {dim} overflows usize"
                    ))
                })?);
            }
            shape.reverse();
            if shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)).is_none() {
                return Err(TensorIoError::format(format!(
                    "tensor `{name}` shape {shape:?} overflows usize"
                )));
            }
            let ggml_type = GgmlType::from_u32(c.read_u32()?)?;
            let offset = c.read_u64()?;
            Ok(TensorInfo { name, shape, ggml_type, offset })
        })?;
        self.tensors_done += 1;
        Ok(Some(info))
    }

    /// Absolute file offset of the data section.
    pub fn data_start(&self) -> Result<usize> {
        self.data_start.ok_or_else(|| TensorIoError::format("tensor index has not been read yet"))
    }

    /// Payload bytes of `info`, borrowed from the mapping.
    pub fn tensor_data(&self, info: &TensorInfo) -> Result<&[u8]> {
        self.expect_section(Section::Data, "tensor_data")?;
        let data = self.mapped()?;
        let offset = usize::try_from(info.offset)
            .ok()
            .filter(|o| o % self.alignment == 0)
            .ok_or_else(|| {
                TensorIoError::format(format!(
                    "tensor `{}` offset {} is not aligned to {}",
                    info.name, info.offset, self.alignment
                ))
            })?;
        let size = info.byte_size()?;
        let start = self.data_start()?.checked_add(offset);
        start
            .and_then(|s| data.get(s..s.checked_add(size)?))
            .ok_or_else(|| {
                TensorIoError::format(format!(
                    "tensor `{}` ({size} bytes at offset {offset}) extends past the end of \
                     the file",
                    info.name
                ))
            })
    }

    // -----------------------------------------------------------------------
    // Create mode
    // -----------------------------------------------------------------------

    /// Create `path` and write a header whose counts [`close`](Self::close) patches.
    pub fn create(path: &Path, config: &CodecConfig) -> Result<Self> {
        config.validate()?;
        let file = File::create(path).map_err(|e| TensorIoError::io(path, e))?;
        let mut ctx = Self::new(Handle::Created(Some(BufWriter::new(file))), path, config);
        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(&GGUF_MAGIC);
        header.extend_from_slice(&config.gguf_version.to_le_bytes());
        header.extend_from_slice(&0u64.to_le_bytes());
        header.extend_from_slice(&0u64.to_le_bytes());
        ctx.write_raw(&header)?;
        Ok(ctx)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let path = &self.path;
        match &mut self.handle {
            Handle::Created(Some(w)) => w.write_all(bytes).map_err(|e| TensorIoError::io(path, e))?,
            _ => return Err(TensorIoError::format("container is not open for writing")),
        }
        self.cursor += bytes.len();
        Ok(())
    }

    fn pad_to(&mut self, target: usize) -> Result<()> {
        if target > self.cursor {
            let zeros = vec![0u8; target - self.cursor];
            self.write_raw(&zeros)?;
        }
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_raw(&(s.len() as u64).to_le_bytes())?;
        self.write_raw(s.as_bytes())
    }

    /// Append a metadata record from an already encoded value.
    pub fn append_raw_kv(&mut self, key: &str, tag: GgufValueType, value: &[u8]) -> Result<()> {
        self.expect_section(Section::Metadata, "append_kv")?;
        self.write_string(key)?;
        self.write_raw(&tag.as_u32().to_le_bytes())?;
        self.write_raw(value)?;
        self.kv_done += 1;
        Ok(())
    }

    pub fn append_kv(&mut self, key: &str, value: &MetadataValue) -> Result<()> {
        let (tag, bytes) = metadata::encode_value(key, value)?;
        self.append_raw_kv(key, tag, &bytes)
    }

    /// Append a descriptor. `shape` is in host order; `offset` must be aligned
    /// and not before the end of the previous payload.
    pub fn append_tensor_info(
        &mut self,
        name: &str,
        shape: &[usize],
        ggml_type: GgmlType,
        offset: u64,
    ) -> Result<()> {
        if self.section == Section::Metadata {
            self.section = Section::Descriptors;
        }
        self.expect_section(Section::Descriptors, "append_tensor_info")?;
        if shape.len() > MAX_DIMS {
            return Err(TensorIoError::format(format!(
                "tensor `{name}` has {} dimensions (max {MAX_DIMS})",
                shape.len()
            )));
        }
        if offset % self.alignment as u64 != 0 {
            return Err(TensorIoError::format(format!(
                "tensor `{name}` offset {offset} is not aligned to {}",
                self.alignment
            )));
        }
        if let Some(&(prev, size)) = self.descriptors.last() {
            if offset < prev + size as u64 {
                return Err(TensorIoError::format(format!(
                    "tensor `{name}` offset {offset} overlaps the previous payload"
                )));
            }
        }
        let size = ggml_type
            .byte_size(shape.iter().product())
            .map_err(|e| TensorIoError::format(format!("`{name}`: {e}")))?;

        self.write_string(name)?;
        self.write_raw(&(shape.len() as u32).to_le_bytes())?;
        for &dim in shape.iter().rev() {
            self.write_raw(&(dim as u64).to_le_bytes())?;
        }
        self.write_raw(&ggml_type.as_u32().to_le_bytes())?;
        self.write_raw(&offset.to_le_bytes())?;
        self.descriptors.push((offset, size));
        self.tensors_done += 1;
        Ok(())
    }

    /// Append the payload of the next descriptor, in descriptor order.
    pub fn append_tensor_data(&mut self, bytes: &[u8]) -> Result<()> {
        if self.section < Section::Data {
            self.section = Section::Data;
            let start = align_up(self.cursor, self.alignment);
            self.pad_to(start)?;
            self.data_start = Some(start);
        }
        let Some(&(offset, size)) = self.descriptors.get(self.payloads_done) else {
            return Err(TensorIoError::format(format!(
                "payload {} has no matching descriptor",
                self.payloads_done
            )));
        };
        if bytes.len() != size {
            return Err(TensorIoError::format(format!(
                "payload {} has {} bytes, its descriptor declares {size}",
                self.payloads_done,
                bytes.len()
            )));
        }
        self.pad_to(self.data_start()? + offset as usize)?;
        self.write_raw(bytes)?;
        self.payloads_done += 1;
        Ok(())
    }

    /// Finish the container. In create mode this patches the header counts
    /// and flushes; a reader context is simply released.
    pub fn close(mut self) -> Result<()> {
        let Handle::Created(writer) = &mut self.handle else {
            return Ok(());
        };
        let Some(mut writer) = writer.take() else {
            return Err(TensorIoError::format("container already closed"));
        };
        let path = self.path.clone();

        if self.payloads_done != self.descriptors.len() {
            drop(writer);
            remove_partial(&path);
            return Err(TensorIoError::format(format!(
                "{} of {} tensor payloads were written",
                self.payloads_done,
                self.descriptors.len()
            )));
        }
        let patch = (|| {
            writer.flush()?;
            writer.seek(SeekFrom::Start(8))?;
            writer.write_all(&self.tensors_done.to_le_bytes())?;
            writer.write_all(&self.kv_done.to_le_bytes())?;
            writer.flush()?;
            writer.get_ref().sync_all()
        })();
        if let Err(e) = patch {
            drop(writer);
            remove_partial(&path);
            return Err(TensorIoError::io(path, e));
        }
        debug!(
            path = %path.display(),
            tensors = self.tensors_done,
            kv = self.kv_done,
            bytes = self.cursor,
            "closed GGUF container"
        );
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        match self.handle {
            Handle::Mapped(_) => Mode::Read,
            Handle::Created(_) => Mode::Create,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn tensor_count(&self) -> u64 {
        self.n_tensors
    }

    pub fn kv_count(&self) -> u64 {
        self.n_kv
    }

    pub fn offset(&self) -> usize {
        self.cursor
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Replace the data alignment. Only valid before the data section is located.
    pub fn set_alignment(&mut self, alignment: usize) -> Result<()> {
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(TensorIoError::format(format!(
                "alignment must be a non-zero power of two, got {alignment}"
            )));
        }
        if self.section == Section::Data {
            return Err(TensorIoError::format("alignment cannot change inside the data section"));
        }
        self.alignment = alignment;
        Ok(())
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "failed to remove partial GGUF file");
    }
}

impl Drop for ContainerContext {
    fn drop(&mut self) {
        if let Handle::Created(writer) = &mut self.handle {
            if let Some(writer) = writer.take() {
                drop(writer);
                debug!(path = %self.path.display(), "removing unfinished GGUF file");
                remove_partial(&self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensorio_common::Tensor;
    use tempfile::TempDir;

    fn config() -> CodecConfig {
        CodecConfig::default()
    }

    #[test]
    fn header_counts_are_patched_on_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.gguf");
        let mut ctx = ContainerContext::create(&path, &config()).unwrap();
        assert_eq!(ctx.mode(), Mode::Create);
        ctx.append_kv("general.name", &MetadataValue::from("x")).unwrap();
        ctx.append_tensor_info("t", &[2], GgmlType::F32, 0).unwrap();
        ctx.append_tensor_data(&[0u8; 8]).unwrap();
        ctx.close().unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"GGUF");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 3);
        assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().unwrap()), 1);
        assert_eq!(u64::from_le_bytes(bytes[16..24].try_into().unwrap()), 1);
        assert_eq!(bytes.len() % 32, 8, "data starts on a 32-byte boundary");
    }

    #[test]
    fn reads_back_what_was_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("b.gguf");
        let mut ctx = ContainerContext::create(&path, &config()).unwrap();
        ctx.append_kv("n", &MetadataValue::Scalar(Tensor::scalar(7u32))).unwrap();
        ctx.append_tensor_info("m", &[3, 2], GgmlType::I8, 0).unwrap();
        ctx.append_tensor_info("v", &[4], GgmlType::I16, 32).unwrap();
        ctx.append_tensor_data(&[1, 2, 3, 4, 5, 6]).unwrap();
        ctx.append_tensor_data(&[9u8; 8]).unwrap();
        ctx.close().unwrap();

        let mut ctx = ContainerContext::open(&path, &config()).unwrap();
        assert_eq!(ctx.mode(), Mode::Read);
        assert_eq!((ctx.tensor_count(), ctx.kv_count()), (2, 1));
        assert_eq!(ctx.next_key().unwrap().as_deref(), Some("n"));
        assert_eq!(ctx.read_value().unwrap(), MetadataValue::Scalar(Tensor::scalar(7u32)));
        assert_eq!(ctx.next_key().unwrap(), None);

        let m = ctx.next_tensor_info().unwrap().unwrap();
        assert_eq!(m.shape, vec![3, 2]);
        let v = ctx.next_tensor_info().unwrap().unwrap();
        assert_eq!(v.offset, 32);
        assert!(ctx.next_tensor_info().unwrap().is_none());
        assert_eq!(ctx.section(), Section::Data);

        assert_eq!(ctx.tensor_data(&m).unwrap(), &[1u8, 2, 3, 4, 5, 6]);
        assert_eq!(ctx.tensor_data(&v).unwrap(), &[9u8; 8]);
        assert_eq!(ctx.data_start().unwrap() % 32, 0);
    }

    #[test]
    fn dims_are_stored_reversed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.gguf");
        let mut ctx = ContainerContext::create(&path, &config()).unwrap();
        ctx.append_tensor_info("x", &[3, 2], GgmlType::F32, 0).unwrap();
        ctx.append_tensor_data(&[0u8; 24]).unwrap();
        ctx.close().unwrap();

        let bytes = fs::read(&path).unwrap();
        // header, name_len + "x", n_dims
        let dims = HEADER_LEN + 8 + 1 + 4;
        assert_eq!(u64::from_le_bytes(bytes[dims..dims + 8].try_into().unwrap()), 2);
        assert_eq!(u64::from_le_bytes(bytes[dims + 8..dims + 16].try_into().unwrap()), 3);
    }

    #[test]
    fn sections_only_move_forward() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("d.gguf");
        let mut ctx = ContainerContext::create(&path, &config()).unwrap();
        ctx.append_tensor_info("x", &[1], GgmlType::F32, 0).unwrap();
        let err = ctx.append_kv("late", &MetadataValue::from("v")).unwrap_err();
        assert!(matches!(err, TensorIoError::Format(_)));
        ctx.append_tensor_data(&[0u8; 4]).unwrap();
        assert!(ctx.append_tensor_info("y", &[1], GgmlType::F32, 32).is_err());
        assert!(ctx.append_tensor_data(&[0u8; 4]).is_err(), "no descriptor left");
    }

    #[test]
    fn misaligned_or_overlapping_offsets_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("e.gguf");
        let mut ctx = ContainerContext::create(&path, &config().with_alignment(8)).unwrap();
        assert!(ctx.append_tensor_info("a", &[7], GgmlType::I8, 4).is_err());
        ctx.append_tensor_info("a", &[9], GgmlType::I8, 0).unwrap();
        assert!(ctx.append_tensor_info("b", &[1], GgmlType::I8, 8).is_err());
        ctx.append_tensor_info("b", &[1], GgmlType::I8, 16).unwrap();
    }

    #[test]
    fn dropping_an_unfinished_file_removes_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.gguf");
        let mut ctx = ContainerContext::create(&path, &config()).unwrap();
        ctx.append_kv("k", &MetadataValue::from("v")).unwrap();
        assert!(path.exists());
        drop(ctx);
        assert!(!path.exists());
    }

    #[test]
    fn close_with_missing_payloads_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("g.gguf");
        let mut ctx = ContainerContext::create(&path, &config()).unwrap();
        ctx.append_tensor_info("x", &[1], GgmlType::F32, 0).unwrap();
        assert!(ctx.close().is_err());
        assert!(!path.exists());
    }

    #[test]
    fn open_reports_missing_files_as_io() {
        let err =
            ContainerContext::open(Path::new("/definitely/not/here.gguf"), &config()).unwrap_err();
        assert!(matches!(err, TensorIoError::Io { .. }));
    }

    #[test]
    fn open_rejects_bad_headers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h.gguf");

        fs::write(&path, b"GGUF").unwrap();
        assert!(ContainerContext::open(&path, &config()).is_err());

        let mut header = b"GGML".to_vec();
        header.extend_from_slice(&[0u8; 20]);
        fs::write(&path, &header).unwrap();
        assert!(ContainerContext::open(&path, &config()).is_err());

        let mut header = b"GGUF".to_vec();
        header.extend_from_slice(&1u32.to_le_bytes());
        header.extend_from_slice(&[0u8; 16]);
        fs::write(&path, &header).unwrap();
        let err = ContainerContext::open(&path, &config()).unwrap_err();
        assert!(err.to_string().contains("version 1"));
    }

    #[test]
    fn set_alignment_validates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("i.gguf");
        let mut ctx = ContainerContext::create(&path, &config()).unwrap();
        assert!(ctx.set_alignment(0).is_err());
        assert!(ctx.set_alignment(12).is_err());
        ctx.set_alignment(64).unwrap();
        assert_eq!(ctx.alignment(), 64);
    }
}
