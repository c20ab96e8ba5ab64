//! Writing documents to disk and reading them back.

use crate::config::DumpConfig;
use crate::document::{BlobSet, SerializedDocument};
use aijson_core::{AijsonError, PayloadName, Result};
use aijson_observability::spans;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Writes a serialized graph to some destination.
pub trait Disposer: Send + Sync {
    /// Format name this disposer was registered under.
    fn format(&self) -> &str;

    fn write(&self, document: &SerializedDocument, blobs: &BlobSet) -> Result<()>;
}

/// JSON manifest at `path`, payload files next to it named
/// `{manifest stem}.{payload name}`.
#[derive(Debug, Clone)]
pub struct JsonDisposer {
    path: PathBuf,
    pretty: bool,
}

impl JsonDisposer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), pretty: true }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn blob_path(&self, name: &PayloadName) -> PathBuf {
        manifest_dir(&self.path).join(name.as_str())
    }

    /// Name a payload is stored under next to this manifest: prefixed with
    /// the manifest file stem, so manifests sharing a directory never share
    /// payload files.
    pub fn payload_name(&self, name: &PayloadName) -> PayloadName {
        let namespace = self
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy())
            .filter(|stem| !stem.is_empty());
        match namespace {
            Some(namespace) => name.namespaced(&namespace),
            None => name.clone(),
        }
    }

    /// Document and blobs renamed to their on-disk payload names. Fails
    /// before anything is written if a name would leave the manifest
    /// directory.
    fn stored(
        &self,
        document: &SerializedDocument,
        blobs: &BlobSet,
    ) -> Result<(SerializedDocument, BlobSet)> {
        let mut stored = document.clone();
        for (key, node) in &mut stored.nodes {
            if let Some(name) = node.payload_ref.as_mut() {
                *name = self.payload_name(name);
                if !is_plain_file_name(name.as_str()) {
                    return Err(AijsonError::InvalidDocument(format!(
                        "node {key} payload `{name}` is not a plain file name"
                    )));
                }
            }
        }
        let mut stored_blobs = BlobSet::new();
        for blob in blobs.iter() {
            let name = self.payload_name(&blob.name);
            if !is_plain_file_name(name.as_str()) {
                return Err(AijsonError::InvalidDocument(format!(
                    "payload `{name}` is not a plain file name"
                )));
            }
            stored_blobs.insert(name, blob.bytes.clone());
        }
        Ok((stored, stored_blobs))
    }
}

impl Disposer for JsonDisposer {
    fn format(&self) -> &str {
        "json"
    }

    fn write(&self, document: &SerializedDocument, blobs: &BlobSet) -> Result<()> {
        let span = spans::dump_document(&self.path, self.format());
        let _guard = span.enter();

        let (document, blobs) = self.stored(document, blobs)?;
        let text = document.to_json_string(self.pretty)?;
        std::fs::create_dir_all(manifest_dir(&self.path))?;
        for blob in blobs.iter() {
            let path = self.blob_path(&blob.name);
            write_atomic(&path, &blob.bytes)?;
            debug!(path = %path.display(), bytes = blob.bytes.len(), "wrote payload");
        }
        write_atomic(&self.path, text.as_bytes())?;
        info!(
            path = %self.path.display(),
            nodes = document.len(),
            payloads = blobs.len(),
            "wrote graph document"
        );
        Ok(())
    }
}

fn manifest_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Writes through a temporary file in the destination directory so that a
/// failed write never leaves a truncated file behind.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = tempfile::NamedTempFile::new_in(manifest_dir(path))?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| AijsonError::Io(err.error))?;
    Ok(())
}

pub type DisposerFactory = Box<dyn Fn(&DumpConfig) -> Box<dyn Disposer> + Send + Sync>;

/// Explicit map from format name to disposer.
pub struct FormatRegistry {
    factories: HashMap<String, DisposerFactory>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("json", |config| {
            Box::new(JsonDisposer::new(config.path.clone()).pretty(config.pretty))
        });
        registry
    }
}

impl FormatRegistry {
    pub fn empty() -> Self {
        Self { factories: HashMap::new() }
    }

    pub fn register<F>(&mut self, format: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&DumpConfig) -> Box<dyn Disposer> + Send + Sync + 'static,
    {
        self.factories.insert(format.into().to_lowercase(), Box::new(factory));
        self
    }

    /// Disposer for `config.format`. Fails before anything is written when
    /// the format is unknown.
    pub fn disposer(&self, config: &DumpConfig) -> Result<Box<dyn Disposer>> {
        let factory = self
            .factories
            .get(&config.format.to_lowercase())
            .ok_or_else(|| AijsonError::UnsupportedFormat { format: config.format.clone() })?;
        Ok(factory(config))
    }

    pub fn formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }
}

/// Reads a JSON manifest and the payload files it names.
///
/// Payload files that do not exist are left out of the blob set, so that
/// validation or reconstruction reports which node is missing its blob.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<(SerializedDocument, BlobSet)> {
    let path = path.as_ref();
    let span = spans::load_manifest(path);
    let _guard = span.enter();

    let text = std::fs::read_to_string(path)?;
    let document = SerializedDocument::from_json_str(&text)?;
    let dir = manifest_dir(path);
    let mut blobs = BlobSet::new();
    for (key, node) in &document.nodes {
        let Some(name) = &node.payload_ref else {
            continue;
        };
        if !is_plain_file_name(name.as_str()) {
            return Err(AijsonError::InvalidDocument(format!(
                "node {key} payload_ref `{name}` is not a plain file name"
            )));
        }
        match std::fs::read(dir.join(name.as_str())) {
            Ok(bytes) => blobs.insert(name.clone(), bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(node = key.as_str(), payload = name.as_str(), "payload file not found");
            }
            Err(err) => return Err(err.into()),
        }
    }
    info!(path = %path.display(), nodes = document.len(), payloads = blobs.len(), "loaded graph document");
    Ok((document, blobs))
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
