//! Pipeline document store - writes and reads pipeline JSON files

use crate::core::{DocumentError, PipelineGraph};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const MAX_NAME_LEN: usize = 50;
const FALLBACK_NAME: &str = "pipeline";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Pipeline JSON is malformed: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Pipeline JSON must be an object keyed by node name, not an array or scalar")]
    NotAnObject,

    #[error("Pipeline JSON must contain at least one node")]
    Empty,

    #[error("File already exists and overwrite is off: {0}")]
    Exists(PathBuf),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No user data directory available")]
    NoDataDir,

    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where a document should be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveTarget {
    /// Generated file name inside the store directory
    Default,
    /// An explicit file, or a directory to generate the file name in
    Path(PathBuf),
}

/// Saves pipeline documents to disk
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at `<data dir>/uiflow/pipelines`
    pub fn with_default_dir() -> Result<Self, StoreError> {
        let data_dir = dirs::data_local_dir().ok_or(StoreError::NoDataDir)?;
        Ok(Self::new(data_dir.join("uiflow").join("pipelines")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a raw JSON document, pretty-printed
    ///
    /// Only the top-level shape is checked here; node semantics are checked
    /// when the document is loaded into a graph.
    pub fn save(
        &self,
        json: &str,
        target: &SaveTarget,
        name: Option<&str>,
        overwrite: bool,
    ) -> Result<PathBuf, StoreError> {
        let document: serde_json::Value = serde_json::from_str(json)?;
        match document.as_object() {
            None => return Err(StoreError::NotAnObject),
            Some(map) if map.is_empty() => return Err(StoreError::Empty),
            Some(_) => {}
        }

        let path = self.resolve(target, name);
        if path.exists() && !overwrite {
            return Err(StoreError::Exists(path));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let pretty = serde_json::to_string_pretty(&document)?;
        std::fs::write(&path, pretty).map_err(|e| StoreError::io(&path, e))?;

        info!("Saved pipeline to {}", path.display());
        Ok(path)
    }

    /// Serialize a graph and save it
    pub fn save_graph(
        &self,
        graph: &PipelineGraph,
        target: &SaveTarget,
        name: Option<&str>,
        overwrite: bool,
    ) -> Result<PathBuf, StoreError> {
        self.save(&graph.to_json(), target, name, overwrite)
    }

    /// Load and validate a saved document
    pub fn load(&self, path: &Path) -> Result<PipelineGraph, StoreError> {
        let json = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        Ok(PipelineGraph::from_json(&json)?)
    }

    /// Saved documents in the store directory, sorted by file name
    pub fn list(&self) -> Result<Vec<PathBuf>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&self.root, e))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn resolve(&self, target: &SaveTarget, name: Option<&str>) -> PathBuf {
        let dir = match target {
            SaveTarget::Path(path) if !path.is_dir() => return path.clone(),
            SaveTarget::Path(dir) => dir.clone(),
            SaveTarget::Default => self.root.clone(),
        };
        let path = dir.join(generated_file_name(name));
        debug!("Generated document path {}", path.display());
        path
    }
}

/// Keep alphanumerics and `._- `, trimmed and capped in length
pub fn sanitize_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || "._- ".contains(*c))
        .collect();
    let trimmed: String = kept.trim().chars().take(MAX_NAME_LEN).collect();
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed
    }
}

fn generated_file_name(name: Option<&str>) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let stem = name.map(sanitize_name).unwrap_or_else(|| FALLBACK_NAME.to_string());
    format!("{}_{}.json", stem, timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{"Start": {"action": "DoNothing"}}"#;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("my/flow: v2"), "myflow v2");
        assert_eq!(sanitize_name("  ***  "), "pipeline");
        assert_eq!(sanitize_name(&"a".repeat(80)).len(), 50);
    }

    #[test]
    fn test_save_to_directory_generates_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("unused"));

        let path = store
            .save(DOC, &SaveTarget::Path(dir.path().to_path_buf()), Some("daily run"), true)
            .unwrap();

        assert_eq!(path.parent(), Some(dir.path()));
        let file_name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("daily run_"));
        assert!(file_name.ends_with(".json"));
    }

    #[test]
    fn test_save_default_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("pipelines"));

        let path = store.save(DOC, &SaveTarget::Default, None, true).unwrap();
        assert!(path.starts_with(store.root()));
        assert_eq!(store.list().unwrap(), vec![path.clone()]);

        let graph = store.load(&path).unwrap();
        assert!(graph.contains("Start"));
    }

    #[test]
    fn test_explicit_file_respects_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let target = SaveTarget::Path(dir.path().join("nested").join("flow.json"));

        store.save(DOC, &target, None, false).unwrap();
        let err = store.save(DOC, &target, None, false).unwrap_err();
        assert!(matches!(err, StoreError::Exists(_)));
        assert!(store.save(DOC, &target, None, true).is_ok());
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());

        assert!(matches!(
            store.save("[1, 2]", &SaveTarget::Default, None, true),
            Err(StoreError::NotAnObject)
        ));
        assert!(matches!(
            store.save("{}", &SaveTarget::Default, None, true),
            Err(StoreError::Empty)
        ));
        assert!(matches!(
            store.save("{oops", &SaveTarget::Default, None, true),
            Err(StoreError::InvalidJson(_))
        ));
        assert!(store.list().unwrap().is_empty());
    }
}
