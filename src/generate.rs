//! Batch generation of normalized schema artifacts from OpenAPI documents.
//!
//! Each document is loaded, dereferenced, optionally de-cycled, and split
//! into named schemas. Every schema is normalized, checked to compile, and
//! handed to an [`ArtifactEmitter`]. A failing schema is recorded and
//! skipped; a failing document is recorded and the batch moves on.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::cycles::resolve_cycles;
use crate::error::{EmitError, GenerateError};
use crate::graph::SchemaGraph;
use crate::identifier::{make_code_identifier, strip_extensions};
use crate::loader::load_document_auto;
use crate::nullable::replace_nullables;
use crate::operations::{extract_request_schemas, extract_response_schemas};
use crate::types::{CircularRefInfo, Direction};
use crate::validator::SchemaValidator;

/// Default location of named schemas inside a document.
pub const DEFAULT_SCHEMAS_PATH: &str = "#/definitions";

/// Options for a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateConfig {
    /// JSON Pointer fragment of the object holding named schemas.
    pub schemas_path: String,
    /// Cut reference cycles instead of failing on them.
    pub remove_circular: bool,
    /// Extract per-operation request/response schemas instead of using `schemas_path`.
    pub operations: bool,
    pub skip_index: bool,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            schemas_path: DEFAULT_SCHEMAS_PATH.to_string(),
            remove_circular: false,
            operations: false,
            skip_index: false,
        }
    }
}

impl GenerateConfig {
    pub fn with_schemas_path(mut self, path: impl Into<String>) -> Self {
        self.schemas_path = path.into();
        self
    }

    pub fn with_remove_circular(mut self, remove: bool) -> Self {
        self.remove_circular = remove;
        self
    }

    pub fn with_operations(mut self, operations: bool) -> Self {
        self.operations = operations;
        self
    }

    pub fn with_skip_index(mut self, skip: bool) -> Self {
        self.skip_index = skip;
        self
    }
}

/// One normalized schema ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Request/response group in operations mode.
    pub group: Option<Direction>,
    pub name: String,
    pub schema: Value,
}

/// Destination for generated artifacts.
pub trait ArtifactEmitter {
    /// Called once per document before any artifact is emitted.
    fn prepare(&mut self, document: &str) -> Result<(), EmitError>;

    fn emit(&mut self, artifact: &Artifact) -> Result<(), EmitError>;

    /// Called after all artifacts of a document, unless the index is skipped.
    fn write_index(&mut self, names: &[String]) -> Result<(), EmitError>;
}

/// Writes each artifact as pretty-printed JSON under `<output>/<document>/`.
#[derive(Debug, Clone)]
pub struct JsonFileEmitter {
    output: PathBuf,
    current: PathBuf,
}

impl JsonFileEmitter {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        let output = output.into();
        Self {
            current: output.clone(),
            output,
        }
    }

    /// Directory of the document currently being written.
    pub fn current_dir(&self) -> &Path {
        &self.current
    }
}

impl ArtifactEmitter for JsonFileEmitter {
    fn prepare(&mut self, document: &str) -> Result<(), EmitError> {
        self.current = self.output.join(document);
        if self.current.exists() {
            fs::remove_dir_all(&self.current).map_err(|source| EmitError::Io {
                path: self.current.clone(),
                source,
            })?;
        }
        create_dir(&self.current)
    }

    fn emit(&mut self, artifact: &Artifact) -> Result<(), EmitError> {
        let dir = match artifact.group {
            Some(direction) => self.current.join(direction.dir_name()),
            None => self.current.clone(),
        };
        create_dir(&dir)?;
        write_json(&dir.join(format!("{}.json", artifact.name)), &artifact.schema)
    }

    fn write_index(&mut self, names: &[String]) -> Result<(), EmitError> {
        write_json(&self.current.join("index.json"), &json!(names))
    }
}

/// A schema that could not be generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedArtifact {
    pub name: String,
    pub reason: String,
}

/// Outcome of generating one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReport {
    pub document: String,
    pub generated: Vec<String>,
    pub failed: Vec<FailedArtifact>,
    pub circular_refs: Vec<CircularRefInfo>,
}

impl GenerateReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of a batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub documents: Vec<GenerateReport>,
    /// Documents that failed as a whole, with the reason.
    pub failed_documents: Vec<(String, GenerateError)>,
}

impl BatchReport {
    pub fn generated_count(&self) -> usize {
        self.documents.iter().map(|d| d.generated.len()).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.documents.iter().map(|d| d.failed.len()).sum::<usize>() + self.failed_documents.len()
    }

    /// 0 when everything was generated, otherwise the highest document error
    /// code, or 1 when only individual schemas failed.
    pub fn exit_code(&self) -> i32 {
        let document_code = self
            .failed_documents
            .iter()
            .map(|(_, e)| e.exit_code())
            .max();
        match document_code {
            Some(code) => code,
            None if self.failed_count() > 0 => 1,
            None => 0,
        }
    }
}

/// Named schemas of a loaded document, dereferenced and normalized.
///
/// Returns the artifacts, schemas that failed to materialize, and any cycles
/// that were cut.
pub fn collect_schemas(
    document: &Value,
    config: &GenerateConfig,
) -> Result<(Vec<Artifact>, Vec<FailedArtifact>, Vec<CircularRefInfo>), GenerateError> {
    let mut graph = SchemaGraph::from_value(document);
    graph.dereference()?;

    let container = if config.operations {
        Some(graph.root())
    } else {
        graph.lookup(&config.schemas_path)
    };
    let Some(container) = container else {
        return Err(GenerateError::NoSchemas {
            path: config.schemas_path.clone(),
        });
    };

    let circular_refs = if config.remove_circular {
        resolve_cycles(&mut graph, container)
    } else {
        Vec::new()
    };
    for info in &circular_refs {
        debug!(original = %info.original, reference = %info.reference, "removed circular reference");
    }

    let mut artifacts = Vec::new();
    let mut failed = Vec::new();

    if config.operations {
        let document = graph.to_value(container)?;
        for (direction, schemas) in [
            (Direction::Request, extract_request_schemas(&document)),
            (Direction::Response, extract_response_schemas(&document)),
        ] {
            for (name, schema) in schemas {
                artifacts.push(Artifact {
                    group: Some(direction),
                    name,
                    schema: replace_nullables(&schema),
                });
            }
        }
    } else {
        let mut seen: HashMap<String, String> = HashMap::new();
        for (key, node) in graph.children(container) {
            let name = match make_code_identifier(&key) {
                id if id.is_empty() => key.clone(),
                id => id,
            };
            if let Some(first) = seen.get(&name) {
                warn!(schema = %key, %name, %first, "schema name collides with an earlier schema");
                failed.push(FailedArtifact {
                    reason: format!("name {} is already used by schema {}", name, first),
                    name,
                });
                continue;
            }
            seen.insert(name.clone(), key.clone());
            match graph.to_value(node) {
                Ok(schema) => artifacts.push(Artifact {
                    group: None,
                    name,
                    schema: replace_nullables(&schema),
                }),
                Err(e) => {
                    error!(schema = %key, error = %e, "cannot materialize schema");
                    failed.push(FailedArtifact {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    if artifacts.is_empty() && failed.is_empty() {
        let path = if config.operations {
            "#/paths".to_string()
        } else {
            config.schemas_path.clone()
        };
        return Err(GenerateError::NoSchemas { path });
    }

    Ok((artifacts, failed, circular_refs))
}

/// Generate artifacts for one document (file path or URL).
pub fn generate_document(
    source: &str,
    config: &GenerateConfig,
    emitter: &mut dyn ArtifactEmitter,
) -> Result<GenerateReport, GenerateError> {
    let document = load_document_auto(source)?;
    let (artifacts, failed, circular_refs) = collect_schemas(&document, config)?;

    let document_name = document_name(source);
    emitter.prepare(&document_name)?;

    let mut report = GenerateReport {
        document: document_name,
        failed,
        circular_refs,
        ..GenerateReport::default()
    };

    for artifact in artifacts {
        match verify_and_emit(&artifact, emitter) {
            Ok(()) => {
                debug!(name = %artifact.name, "generated schema");
                report.generated.push(artifact.name);
            }
            Err(reason) => {
                error!(name = %artifact.name, %reason, "failed to generate schema");
                report.failed.push(FailedArtifact {
                    name: artifact.name,
                    reason,
                });
            }
        }
    }

    if !config.skip_index {
        emitter.write_index(&report.generated)?;
    }

    info!(
        document = %report.document,
        generated = report.generated.len(),
        failed = report.failed.len(),
        "document processed"
    );
    Ok(report)
}

/// Generate every document, continuing past failures.
pub fn generate_batch(
    sources: &[String],
    config: &GenerateConfig,
    emitter: &mut dyn ArtifactEmitter,
) -> BatchReport {
    let mut batch = BatchReport::default();
    for source in sources {
        match generate_document(source, config, emitter) {
            Ok(report) => batch.documents.push(report),
            Err(e) => {
                warn!(document = %source, error = %e, "skipping document");
                batch.failed_documents.push((source.clone(), e));
            }
        }
    }
    info!(
        generated = batch.generated_count(),
        failed = batch.failed_count(),
        "batch finished"
    );
    batch
}

// --- Internal implementation ---

fn verify_and_emit(artifact: &Artifact, emitter: &mut dyn ArtifactEmitter) -> Result<(), String> {
    let validator = SchemaValidator::new(artifact.schema.clone()).map_err(|e| e.to_string())?;
    validator.validate(&json!({}));
    emitter.emit(artifact).map_err(|e| e.to_string())
}

fn document_name(source: &str) -> String {
    let file_name = source
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source);
    strip_extensions(file_name).to_string()
}

fn create_dir(path: &Path) -> Result<(), EmitError> {
    fs::create_dir_all(path).map_err(|source| EmitError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json(path: &Path, value: &Value) -> Result<(), EmitError> {
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');
    fs::write(path, content).map_err(|source| EmitError::Io {
        path: path.to_path_buf(),
        source,
    })
}
