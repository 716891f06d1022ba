//! Validator configuration.
//!
//! Engine options decide how schemas are compiled (draft, format checks).
//! Error options decide how errors are post-processed. Both have a
//! process-wide default that validators created with
//! [`crate::SchemaValidator::new`] follow; the last writer wins.

use std::sync::{OnceLock, RwLock};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// JSON Schema dialect used to compile schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum SchemaDraft {
    #[value(name = "4")]
    Draft4,
    #[value(name = "6")]
    Draft6,
    #[value(name = "7")]
    Draft7,
    #[value(name = "2019-09")]
    Draft201909,
    #[default]
    #[value(name = "2020-12")]
    Draft202012,
}

impl SchemaDraft {
    /// Parse a draft name such as `"7"`, `"draft-07"` or `"2020-12"`.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let name = name.trim_start_matches("draft").trim_start_matches(['-', '0']);
        match name {
            "4" => Some(SchemaDraft::Draft4),
            "6" => Some(SchemaDraft::Draft6),
            "7" => Some(SchemaDraft::Draft7),
            "2019-09" | "201909" => Some(SchemaDraft::Draft201909),
            "2020-12" | "202012" => Some(SchemaDraft::Draft202012),
            _ => None,
        }
    }

    pub(crate) fn to_engine(self) -> jsonschema::Draft {
        match self {
            SchemaDraft::Draft4 => jsonschema::Draft::Draft4,
            SchemaDraft::Draft6 => jsonschema::Draft::Draft6,
            SchemaDraft::Draft7 => jsonschema::Draft::Draft7,
            SchemaDraft::Draft201909 => jsonschema::Draft::Draft201909,
            SchemaDraft::Draft202012 => jsonschema::Draft::Draft202012,
        }
    }
}

/// Options passed to the schema engine when compiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    pub draft: SchemaDraft,
    /// Check `format` keywords (`uuid`, `date-time`, ...).
    pub validate_formats: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            draft: SchemaDraft::default(),
            validate_formats: true,
        }
    }
}

impl EngineOptions {
    pub fn with_draft(mut self, draft: SchemaDraft) -> Self {
        self.draft = draft;
        self
    }

    pub fn with_formats(mut self, validate_formats: bool) -> Self {
        self.validate_formats = validate_formats;
        self
    }
}

/// Options for post-processing validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOptions {
    /// Drop the `type: null` branch error of a failing nullable
    /// `oneOf`/`anyOf`, together with the combinator error itself.
    pub omit_null_sibling_errors: bool,
}

impl ErrorOptions {
    pub fn with_omit_null_sibling_errors(mut self, omit: bool) -> Self {
        self.omit_null_sibling_errors = omit;
        self
    }
}

/// Complete validator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub engine: EngineOptions,
    pub errors: ErrorOptions,
}

/// Replace the global engine options.
///
/// Validators following the global configuration recompile on their next use.
pub fn set_engine_options(options: EngineOptions) {
    let mut state = global().write().unwrap_or_else(|e| e.into_inner());
    state.config.engine = options;
    state.epoch += 1;
    tracing::debug!(?options, epoch = state.epoch, "engine options updated");
}

/// Replace the global error options. Takes effect on the next validation.
pub fn set_error_options(options: ErrorOptions) {
    let mut state = global().write().unwrap_or_else(|e| e.into_inner());
    state.config.errors = options;
    tracing::debug!(?options, "error options updated");
}

/// Snapshot of the global configuration.
pub fn current_config() -> ValidatorConfig {
    global().read().unwrap_or_else(|e| e.into_inner()).config
}

/// Counter bumped each time the engine options change.
pub fn config_epoch() -> u64 {
    global().read().unwrap_or_else(|e| e.into_inner()).epoch
}

pub(crate) fn engine_snapshot() -> (EngineOptions, u64) {
    let state = global().read().unwrap_or_else(|e| e.into_inner());
    (state.config.engine, state.epoch)
}

// --- Internal implementation ---

#[derive(Debug, Default)]
struct GlobalState {
    config: ValidatorConfig,
    epoch: u64,
}

fn global() -> &'static RwLock<GlobalState> {
    static STATE: OnceLock<RwLock<GlobalState>> = OnceLock::new();
    STATE.get_or_init(|| RwLock::new(GlobalState::default()))
}
