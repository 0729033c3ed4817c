//! Snapshot tests for `tensorio-gguf` public constants and error messages.
//!
//! Pins the magic, version range and the wording of errors users see for
//! malformed or unsupported input.

use std::collections::HashMap;
use tempfile::TempDir;
use tensorio_common::{DType, Tensor};
use tensorio_gguf::quant::{extract, scheme_for};
use tensorio_gguf::{
    GGUF_MAGIC, GGUF_VERSION_MAX, GGUF_VERSION_MIN, GgmlType, MetadataMap, MetadataValue,
    load_gguf, save_gguf,
};

fn write_raw(bytes: &[u8]) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("raw.gguf");
    std::fs::write(&path, bytes).unwrap();
    (dir, path)
}

fn header(magic: &[u8; 4], version: u32) -> Vec<u8> {
    let mut d = magic.to_vec();
    d.extend_from_slice(&version.to_le_bytes());
    d.extend_from_slice(&0u64.to_le_bytes());
    d.extend_from_slice(&0u64.to_le_bytes());
    d
}

#[test]
fn gguf_magic_bytes_snapshot() {
    let magic_str = std::str::from_utf8(&GGUF_MAGIC).unwrap();
    insta::assert_snapshot!(magic_str, @"GGUF");
}

#[test]
fn gguf_version_range_snapshot() {
    let summary = format!("min={GGUF_VERSION_MIN} max={GGUF_VERSION_MAX}");
    insta::assert_snapshot!(summary, @"min=2 max=3");
}

#[test]
fn bad_magic_error() {
    let (_dir, path) = write_raw(&header(b"GGML", 3));
    let err = load_gguf(&path).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"malformed data: invalid GGUF magic [47, 47, 4d, 4c] (expected 'GGUF')"
    );
}

#[test]
fn unsupported_version_error() {
    let (_dir, path) = write_raw(&header(b"GGUF", 4));
    let err = load_gguf(&path).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"malformed data: unsupported GGUF version 4 (supported: 2-3)"
    );
}

#[test]
fn unsupported_dtype_error() {
    let dir = TempDir::new().unwrap();
    let tensors = HashMap::from([("mask".to_string(), Tensor::from_bools(&[true], &[1]).unwrap())]);
    let err = save_gguf(dir.path().join("x.gguf"), &tensors, &MetadataMap::new()).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"`mask`: dtype bool is not supported");
}

#[test]
fn metadata_rank_error() {
    let dir = TempDir::new().unwrap();
    let mut metadata = MetadataMap::new();
    metadata.insert("grid".into(), MetadataValue::Array(Tensor::zeros(DType::F32, &[2, 2])));
    let tensors: HashMap<String, Tensor> = HashMap::new();
    let err = save_gguf(dir.path().join("x.gguf"), &tensors, &metadata).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"`grid`: cannot save arrays with 2 dimensions as metadata"
    );
}

#[test]
fn quantized_shape_error() {
    let scheme = scheme_for(GgmlType::Q4_0).unwrap();
    let err = extract("blk.0.attn_k.weight", scheme, &[48], &[0u8; 36]).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"tensor `blk.0.attn_k.weight` has incompatible last dim 48 (must be a multiple of 32)"
    );
}
