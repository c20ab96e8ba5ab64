//! Capture, dump, load and rebuild through the facade crate.

use aijson::{
    capture_scope, deserialize, load_manifest, validate_document, CaptureRegistry, DumpConfig,
    ReconstructorRegistry,
};
use test_support::common::{Compose, Top, Weights};
use test_support::support::scenarios::{build_pipeline, sample_weights};

#[test]
fn model_with_weights_and_pipeline_survives_a_dump() -> anyhow::Result<()> {
    aijson::observability::init_tracing();
    let dir = tempfile::tempdir()?;
    let config = DumpConfig::new(dir.path().join(".model.ai.json"));

    let registry = CaptureRegistry::new();
    let expected = capture_scope(&registry, |scope| {
        let weights = scope.construct(sample_weights)?;
        let pipeline = build_pipeline(scope)?;
        let output = pipeline.read().apply(1.25);
        scope.construct(|| Top { children: vec![weights.handle(), pipeline.handle()] })?;
        tracing::info!(graph = %scope, "captured model");
        scope.dump(&config)?;
        Ok(output)
    })?;
    assert!(!registry.is_active());

    let (document, blobs) = load_manifest(&config.path)?;
    validate_document(&document, &blobs)?;
    assert_eq!(document.len(), 6);
    assert_eq!(blobs.len(), 1);

    let rebuilt = deserialize(&document, &blobs, &ReconstructorRegistry::from_inventory())?;
    let top = rebuilt.root_as::<Top>()?;
    let top = top.read();
    let weights = top.children[0].downcast::<Weights>().expect("weights child");
    assert_eq!(weights.read().values, sample_weights().values);
    let pipeline = top.children[1].downcast::<Compose>().expect("pipeline child");
    assert_eq!(pipeline.read().apply(1.25), expected);
    Ok(())
}

#[test]
fn dump_config_reads_environment_overrides() {
    let config = DumpConfig::from_env();
    match std::env::var("AIJSON_DUMP_PATH") {
        Ok(path) if !path.trim().is_empty() => assert_eq!(config.path, std::path::PathBuf::from(path)),
        _ => assert_eq!(config.path, std::path::PathBuf::from(".model.ai.json")),
    }
}
