//! Library-level tests for `convert` and `inspect`.

use std::collections::HashMap;
use tempfile::TempDir;
use tensorio_cli::commands::InspectCommand;
use tensorio_cli::commands::convert::convert;
use tensorio_cli::config::CliConfig;
use tensorio_formats::{
    MetadataMap, MetadataValue, StringMetadata, Tensor, inspect_gguf, load, load_gguf,
    load_map_with_metadata, save_gguf, save_map, save_map_with_metadata,
};

fn pair() -> HashMap<String, Tensor> {
    HashMap::from([
        ("a".to_string(), Tensor::from_slice(&[1.0f32, 2.0], &[2]).unwrap()),
        ("b".to_string(), Tensor::from_slice(&[3i8, 4, 5], &[3, 1]).unwrap()),
    ])
}

#[test]
fn safetensors_to_gguf_keeps_tensors_and_strings() {
    let dir = TempDir::new().unwrap();
    let strings = StringMetadata::from([("format".to_string(), "pt".to_string())]);
    let input = save_map_with_metadata(dir.path().join("in"), &pair(), &strings).unwrap();

    let out = convert(&input, &dir.path().join("out.gguf"), &CliConfig::default()).unwrap();
    let (tensors, metadata) = load_gguf(&out).unwrap();
    assert_eq!(tensors, pair());
    assert_eq!(metadata["format"].as_str(), Some("pt"));
}

#[test]
fn gguf_to_safetensors_renders_metadata_as_text() {
    let dir = TempDir::new().unwrap();
    let metadata = MetadataMap::from([
        ("general.name".to_string(), MetadataValue::from("demo")),
        ("ctx".to_string(), MetadataValue::Scalar(Tensor::scalar(4096u32))),
    ]);
    let input = save_gguf(dir.path().join("in"), &pair(), &metadata).unwrap();

    let out = convert(&input, &dir.path().join("out.safetensors"), &CliConfig::default()).unwrap();
    let (tensors, strings) = load_map_with_metadata(&out).unwrap();
    assert_eq!(tensors, pair());
    assert_eq!(strings["general.name"], "demo");
    assert_eq!(strings["ctx"], "4096");
}

#[test]
fn npy_output_needs_exactly_one_tensor() {
    let dir = TempDir::new().unwrap();
    let input = save_map(dir.path().join("two"), &pair()).unwrap();
    let err = convert(&input, &dir.path().join("out.npy"), &CliConfig::default()).unwrap_err();
    assert!(err.to_string().contains("exactly one"), "{err}");
    assert!(!dir.path().join("out.npy").exists());

    let one = HashMap::from([("only".to_string(), Tensor::scalar(7u64))]);
    let input = save_map(dir.path().join("one"), &one).unwrap();
    let out = convert(&input, &dir.path().join("out.npy"), &CliConfig::default()).unwrap();
    assert_eq!(load(&out).unwrap(), one["only"]);
}

#[test]
fn configured_alignment_reaches_the_writer() {
    let dir = TempDir::new().unwrap();
    let input = save_map(dir.path().join("in"), &pair()).unwrap();
    let mut config = CliConfig::default();
    config.codec.alignment = 128;
    let out = convert(&input, &dir.path().join("out.gguf"), &config).unwrap();
    let summary = inspect_gguf(&out).unwrap();
    assert_eq!(summary.alignment, 128);
    assert_eq!(summary.data_start % 128, 0);
    assert_eq!(summary.tensors[1].offset, 128);
}

#[test]
fn inspect_report_lists_sorted_tensors() {
    let dir = TempDir::new().unwrap();
    let input = save_map(dir.path().join("in"), &pair()).unwrap();
    let report = InspectCommand::report(&input, &CliConfig::default()).unwrap();
    let names: Vec<_> = report.tensors.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
    assert_eq!(report.tensors[1].dtype, "int8");
    assert_eq!(report.tensors[1].shape, vec![3, 1]);
    assert!(report.header.is_none());
}

#[test]
fn unknown_output_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = save_map(dir.path().join("in"), &pair()).unwrap();
    let err = convert(&input, &dir.path().join("out.pt"), &CliConfig::default()).unwrap_err();
    insta::assert_snapshot!(
        err.to_string().replace(dir.path().to_str().unwrap(), "[dir]"),
        @"cannot tell the format of [dir]/out.pt (expected .npy, .safetensors or .gguf)"
    );
}
