use aijson_core::{AijsonError, ReconstructionError};
use aijson_graph::{
    capture_scope, capture_scope_with, deserialize, load_manifest, BlobSet, CaptureRegistry,
    Disposer, DumpConfig, FormatRegistry, JsonDisposer, SerializedDocument,
};
use std::sync::Mutex;
use test_support::common::{reconstructors, Leaf, Weights};
use test_support::support::scenarios::{build_layered, sample_weights};

/// Keeps what it was handed instead of writing it anywhere.
#[derive(Default)]
struct RecordingDisposer {
    written: Mutex<Vec<(SerializedDocument, BlobSet)>>,
}

impl Disposer for RecordingDisposer {
    fn format(&self) -> &str {
        "memory"
    }

    fn write(&self, document: &SerializedDocument, blobs: &BlobSet) -> aijson_core::Result<()> {
        self.written
            .lock()
            .expect("recording lock")
            .push((document.clone(), blobs.clone()));
        Ok(())
    }
}

#[test]
fn dump_writes_manifest_at_configured_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("graph.ai.json");
    let registry = CaptureRegistry::new();
    capture_scope(&registry, |scope| {
        build_layered(scope)?;
        scope.dump(&DumpConfig::new(&path).with_pretty(false))
    })
    .expect("dump");

    let text = std::fs::read_to_string(&path).expect("manifest");
    assert_eq!(text.lines().count(), 1);
    let (document, blobs) = load_manifest(&path).expect("load");
    assert_eq!(document.len(), 3);
    assert!(blobs.is_empty());
}

#[test]
fn unsupported_format_leaves_no_file_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = DumpConfig::new(dir.path().join("graph.toml")).with_format("toml");
    let registry = CaptureRegistry::new();
    let err = capture_scope(&registry, |scope| {
        scope.construct(sample_weights)?;
        scope.dump(&config)
    })
    .unwrap_err();
    assert!(matches!(err, AijsonError::UnsupportedFormat { ref format } if format == "toml"));
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
    assert!(!registry.is_active());
}

#[test]
fn scope_disposer_runs_only_when_the_body_succeeds() {
    let registry = CaptureRegistry::new();
    let disposer = RecordingDisposer::default();

    capture_scope_with(&registry, &disposer, |scope| {
        scope.construct(|| Leaf { value: 1 })?;
        Ok(())
    })
    .expect("successful scope");
    let _ = capture_scope_with(&registry, &disposer, |scope| -> aijson_core::Result<()> {
        scope.construct(|| Leaf { value: 2 })?;
        Err(AijsonError::InvalidDocument("abandoned".to_string()))
    });

    let written = disposer.written.lock().expect("recording lock");
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].0.len(), 1);
    assert_eq!(registry.node_count(), 0);
}

#[test]
fn custom_formats_can_be_registered() {
    let mut formats = FormatRegistry::default();
    formats.register("compact", |config| {
        Box::new(JsonDisposer::new(config.path.clone()).pretty(false))
    });
    assert_eq!(formats.formats(), vec!["compact", "json"]);
    let disposer = formats
        .disposer(&DumpConfig::new("model.ai.json").with_format("compact"))
        .expect("compact disposer");
    assert_eq!(disposer.format(), "json");
}

#[test]
fn deleted_payload_file_surfaces_as_missing_blob() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = dir.path().join("model.ai.json");
    let registry = CaptureRegistry::new();
    capture_scope_with(&registry, &JsonDisposer::new(&manifest), |scope| {
        scope.construct(sample_weights)?;
        Ok(())
    })
    .expect("dump");

    std::fs::remove_file(dir.path().join("model.ai.node-0.pt")).expect("remove payload");
    let (document, blobs) = load_manifest(&manifest).expect("manifest still loads");
    let err = deserialize(&document, &blobs, &reconstructors()).unwrap_err();
    assert!(matches!(
        err,
        AijsonError::Reconstruction(ReconstructionError::MissingBlob { .. })
    ));
}

#[test]
fn manifests_sharing_a_directory_keep_their_own_payloads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = Weights::from_values(vec![2], vec![1.0, 2.0]);
    let second = Weights::from_values(vec![2], vec![9.0, 9.0]);
    let registry = CaptureRegistry::new();
    for (manifest, weights) in [("a.json", &first), ("b.json", &second)] {
        capture_scope_with(&registry, &JsonDisposer::new(dir.path().join(manifest)), |scope| {
            scope.construct(|| weights.clone())?;
            Ok(())
        })
        .expect("dump");
    }

    let mut files: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, vec!["a.json", "a.node-0.pt", "b.json", "b.node-0.pt"]);

    for (manifest, expected) in [("a.json", &first), ("b.json", &second)] {
        let (document, blobs) = load_manifest(dir.path().join(manifest)).expect("load");
        let rebuilt = deserialize(&document, &blobs, &reconstructors()).expect("deserialize");
        let weights = rebuilt.root_as::<Weights>().expect("weights root");
        assert_eq!(weights.read().values, expected.values, "{manifest}");
    }
}

#[test]
fn payload_ref_outside_manifest_dir_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = dir.path().join("model.ai.json");
    std::fs::write(
        &manifest,
        r#"{"format_version": 1, "nodes": {
            "0": {"type_tag": "test_support.Weights", "arguments": {"shape": [1]}, "payload_ref": "../secret.pt"}
        }}"#,
    )
    .expect("write manifest");
    let err = load_manifest(&manifest).unwrap_err();
    assert!(matches!(err, AijsonError::InvalidDocument(_)));
}

#[test]
fn dump_overwrites_previous_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = DumpConfig::new(dir.path().join("model.ai.json"));
    let registry = CaptureRegistry::new();
    for value in [1, 2] {
        capture_scope(&registry, |scope| {
            scope.construct(|| Leaf { value })?;
            scope.dump(&config)
        })
        .expect("dump");
    }
    let (document, _) = load_manifest(&config.path).expect("load");
    let leaf = document.root_node().expect("root");
    assert_eq!(leaf.arguments["value"], 2);
    let entries = std::fs::read_dir(dir.path()).expect("read dir").count();
    assert_eq!(entries, 1, "no temporary files are left behind");
}
