//! Schema DTO toolkit
//!
//! Normalizes JSON Schemas found in OpenAPI documents and validates or
//! sanitizes payloads against them.
//!
//! Normalization works on plain `serde_json::Value` trees, or on a
//! [`SchemaGraph`] once `$ref` pointers have been dereferenced and nodes may
//! be shared or cyclic:
//!
//! - [`resolve_cycles`] cuts reference cycles, leaving a `_circularRef` sentinel.
//! - [`replace_nullables`] rewrites `nullable: true` into `oneOf` with `null`.
//! - [`filter_properties`] drops properties matching annotations such as `readOnly`.
//! - [`extract_request_schemas`] / [`extract_response_schemas`] mine per-operation bodies.
//!
//! # Example
//!
//! ```
//! use schema_dto::{replace_nullables, RemoveAdditionalOptions, SchemaValidator};
//! use serde_json::json;
//!
//! let schema = replace_nullables(&json!({
//!     "type": "object",
//!     "additionalProperties": false,
//!     "properties": {
//!         "name": { "type": "string", "nullable": true }
//!     }
//! }));
//!
//! let validator = SchemaValidator::new(schema).unwrap();
//! assert!(validator.validate(&json!({ "name": null })).valid);
//!
//! let mut payload = json!({ "name": "Rex", "internal": 1 });
//! validator
//!     .remove_additional(&mut payload, &RemoveAdditionalOptions::default())
//!     .unwrap();
//! assert_eq!(payload, json!({ "name": "Rex" }));
//! ```
//!
//! # Error post-processing
//!
//! | Situation | Reported errors |
//! |-----------|-----------------|
//! | `oneOf`/`anyOf` fails | each branch's errors, then the combinator error |
//! | `oneOf` with `discriminator`, tag matches | the selected branch's errors only |
//! | `oneOf` with `discriminator`, tag missing or unknown | one `discriminator` error |
//! | null-sibling omission on | `type: null` branch errors and their combinator dropped |

mod compile;
mod config;
mod cycles;
mod discriminator;
mod error;
mod generate;
mod graph;
mod identifier;
mod loader;
mod nullable;
mod operations;
mod postprocess;
mod sanitize;
mod types;
mod validator;
mod visibility;

pub use compile::compile;
pub use config::{
    config_epoch, current_config, set_engine_options, set_error_options, EngineOptions,
    ErrorOptions, SchemaDraft, ValidatorConfig,
};
pub use cycles::resolve_cycles;
pub use error::{
    CircularReferenceError, CompileError, DocumentError, EmitError, ErrorEntry, GenerateError,
    RemoveAdditionalPropsError, ScrubError,
};
pub use generate::{
    collect_schemas, generate_batch, generate_document, Artifact, ArtifactEmitter, BatchReport,
    FailedArtifact, GenerateConfig, GenerateReport, JsonFileEmitter, DEFAULT_SCHEMAS_PATH,
};
pub use graph::{Node, NodeId, SchemaGraph};
pub use identifier::{make_code_identifier, strip_extensions};
pub use loader::{
    is_url, load_document, load_document_auto, load_payload, navigate_fragment, parse_document,
    parse_payload, FORMAT_ERROR_PREFIX,
};
pub use nullable::replace_nullables;
pub use operations::{
    extract_request_schemas, extract_response_schemas, is_json_media_type, operation_name,
    OperationSchemas,
};
pub use postprocess::omit_null_sibling_errors;
pub use types::{
    json_type_name, CircularRefInfo, Direction, ValidationResult, CIRCULAR_REF_KEY,
    HTTP_METHODS, VALIDATION_MESSAGE_KEY,
};
pub use validator::{
    ErrorLogger, RemoveAdditionalOptions, SchemaValidator, Scrubbable, REMOVE_ADDITIONAL_MESSAGE,
};
pub use visibility::{filter_properties, matches_criteria};

#[cfg(feature = "remote")]
pub use loader::load_document_url;
