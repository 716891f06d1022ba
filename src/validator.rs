//! Compiled schemas for validating and sanitizing payloads.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use jsonschema::Validator;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::compile::{compile, BranchValidators};
use crate::config::{current_config, engine_snapshot, EngineOptions, ValidatorConfig};
use crate::error::{CompileError, ErrorEntry, RemoveAdditionalPropsError, ScrubError};
use crate::postprocess::{omit_null_sibling_errors, ErrorCollector};
use crate::sanitize::Sanitizer;
use crate::types::{ValidationResult, VALIDATION_MESSAGE_KEY};

/// Prefix of the message reported when sanitization leaves an invalid object.
pub const REMOVE_ADDITIONAL_MESSAGE: &str = "Invalid object found when using removeAdditional(): ";

/// Receiver for sanitization failure messages.
pub trait ErrorLogger {
    fn error(&self, message: &str);
}

/// Options for [`SchemaValidator::remove_additional`] and [`SchemaValidator::scrub`].
#[derive(Clone, Copy, Default)]
pub struct RemoveAdditionalOptions<'a> {
    /// Return an error instead of logging when the result is invalid.
    pub strict: bool,
    pub logger: Option<&'a dyn ErrorLogger>,
    /// Takes priority over `logger`.
    pub error_logger: Option<&'a dyn Fn(&str)>,
}

impl<'a> RemoveAdditionalOptions<'a> {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn with_logger(mut self, logger: &'a dyn ErrorLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_error_logger(mut self, error_logger: &'a dyn Fn(&str)) -> Self {
        self.error_logger = Some(error_logger);
        self
    }

    fn sink(&self) -> LogSink<'a> {
        match (self.error_logger, self.logger) {
            (Some(callback), _) => LogSink::Callback(callback),
            (None, Some(logger)) => LogSink::Logger(logger),
            (None, None) => LogSink::None,
        }
    }
}

impl std::fmt::Debug for RemoveAdditionalOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoveAdditionalOptions")
            .field("strict", &self.strict)
            .field("logger", &self.logger.is_some())
            .field("error_logger", &self.error_logger.is_some())
            .finish()
    }
}

enum LogSink<'a> {
    None,
    Callback(&'a dyn Fn(&str)),
    Logger(&'a dyn ErrorLogger),
}

impl LogSink<'_> {
    /// Deliver `message`, swallowing any panic raised by the receiver.
    fn emit(&self, message: &str) {
        let outcome = match self {
            LogSink::None => return,
            LogSink::Callback(callback) => catch_unwind(AssertUnwindSafe(|| callback(message))),
            LogSink::Logger(logger) => catch_unwind(AssertUnwindSafe(|| logger.error(message))),
        };
        if outcome.is_err() {
            debug!("error logger panicked, ignoring");
        }
    }
}

/// Values that can be scrubbed.
///
/// Implementors holding native `created_at`/`updated_at` timestamps return
/// them from [`Scrubbable::timestamps`] so they are written as ISO-8601 text.
pub trait Scrubbable: Serialize {
    fn timestamps(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        None
    }
}

impl Scrubbable for Value {}

/// A schema compiled for repeated validation and sanitization.
///
/// Built with [`SchemaValidator::new`], it follows the global engine options
/// and recompiles on first use after they change. Built with
/// [`SchemaValidator::with_config`], it keeps its own configuration.
pub struct SchemaValidator {
    schema: Arc<Value>,
    pinned: Option<ValidatorConfig>,
    unit: RwLock<Arc<CompiledUnit>>,
}

struct CompiledUnit {
    epoch: u64,
    validator: Validator,
    branches: BranchValidators,
}

impl CompiledUnit {
    fn build(schema: &Arc<Value>, options: EngineOptions, epoch: u64) -> Result<Self, CompileError> {
        Ok(Self {
            epoch,
            validator: compile(schema, &options)?,
            branches: BranchValidators::new(Arc::clone(schema), options),
        })
    }
}

impl SchemaValidator {
    /// Compile `schema` with the global configuration.
    pub fn new(schema: Value) -> Result<Self, CompileError> {
        let (options, epoch) = engine_snapshot();
        let schema = Arc::new(schema);
        let unit = CompiledUnit::build(&schema, options, epoch)?;
        Ok(Self {
            schema,
            pinned: None,
            unit: RwLock::new(Arc::new(unit)),
        })
    }

    /// Compile `schema` with an explicit configuration, ignoring global changes.
    pub fn with_config(schema: Value, config: ValidatorConfig) -> Result<Self, CompileError> {
        let schema = Arc::new(schema);
        let unit = CompiledUnit::build(&schema, config.engine, 0)?;
        Ok(Self {
            schema,
            pinned: Some(config),
            unit: RwLock::new(Arc::new(unit)),
        })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// The schema's `x-validation-message`, if it is a string.
    pub fn custom_message(&self) -> Option<&str> {
        self.schema.get(VALIDATION_MESSAGE_KEY).and_then(Value::as_str)
    }

    /// Validate `instance`. Invalid instances are reported, never raised.
    pub fn validate(&self, instance: &Value) -> ValidationResult {
        let unit = self.unit();
        let errors = ErrorCollector::new(&unit.branches).collect(&unit.validator, instance);
        let valid = errors.is_empty();

        let errors = if self.error_options_omit_null() {
            omit_null_sibling_errors(errors)
        } else {
            errors
        };

        ValidationResult {
            valid,
            errors: if valid { None } else { Some(errors) },
            custom_message: self.custom_message().map(str::to_string),
        }
    }

    /// Remove properties the schema does not declare, in place.
    ///
    /// If the sanitized instance is still invalid the errors go to the
    /// configured logger, or are returned as an error in strict mode.
    pub fn remove_additional(
        &self,
        instance: &mut Value,
        options: &RemoveAdditionalOptions<'_>,
    ) -> Result<(), RemoveAdditionalPropsError> {
        let unit = self.unit();
        Sanitizer::new(&unit.branches).sanitize(instance);

        let result = self.validate(instance);
        if result.valid {
            return Ok(());
        }
        let errors = result.errors.unwrap_or_default();

        if options.strict {
            return Err(RemoveAdditionalPropsError {
                validation_errors: errors,
                schema: (*self.schema).clone(),
            });
        }

        let message = remove_additional_message(&errors);
        debug!(%message, "sanitized object is still invalid");
        options.sink().emit(&message);
        Ok(())
    }

    /// Serialize `input`, remove additional properties, and render native
    /// `created_at`/`updated_at` timestamps as ISO-8601 text.
    pub fn scrub<T: Scrubbable + ?Sized>(
        &self,
        input: &T,
        options: &RemoveAdditionalOptions<'_>,
    ) -> Result<Value, ScrubError> {
        let mut value = serde_json::to_value(input)?;
        self.remove_additional(&mut value, options)?;

        if let (Some((created, updated)), Some(object)) = (input.timestamps(), value.as_object_mut()) {
            if object.contains_key("created_at") && object.contains_key("updated_at") {
                object.insert("created_at".into(), iso_timestamp(&created));
                object.insert("updated_at".into(), iso_timestamp(&updated));
            }
        }

        Ok(value)
    }

    // --- Internal implementation ---

    fn unit(&self) -> Arc<CompiledUnit> {
        let current = Arc::clone(&self.unit.read().unwrap_or_else(|e| e.into_inner()));
        if self.pinned.is_some() {
            return current;
        }

        let (options, epoch) = engine_snapshot();
        if current.epoch == epoch {
            return current;
        }

        match CompiledUnit::build(&self.schema, options, epoch) {
            Ok(unit) => {
                debug!(epoch, "recompiled schema after engine options changed");
                let unit = Arc::new(unit);
                *self.unit.write().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&unit);
                unit
            }
            Err(e) => {
                warn!(error = %e, "schema does not compile with new engine options, keeping previous");
                current
            }
        }
    }

    fn error_options_omit_null(&self) -> bool {
        self.pinned
            .unwrap_or_else(current_config)
            .errors
            .omit_null_sibling_errors
    }
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &self.schema)
            .field("pinned", &self.pinned)
            .finish()
    }
}

fn remove_additional_message(errors: &[ErrorEntry]) -> String {
    let lines: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!(
        "{}{}",
        REMOVE_ADDITIONAL_MESSAGE,
        serde_json::to_string(&lines).unwrap_or_default()
    )
}

fn iso_timestamp(timestamp: &DateTime<Utc>) -> Value {
    Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ErrorOptions, SchemaDraft};
    use chrono::TimeZone;
    use serde_json::json;
    use std::cell::RefCell;

    fn closed_schema() -> Value {
        json!({
            "type": "object",
            "required": ["a"],
            "additionalProperties": false,
            "properties": { "a": { "type": "number" } }
        })
    }

    #[test]
    fn validate_valid_payload() {
        let validator = SchemaValidator::with_config(closed_schema(), ValidatorConfig::default()).unwrap();
        let result = validator.validate(&json!({ "a": 1 }));
        assert!(result.valid);
        assert!(result.errors.is_none());
    }

    #[test]
    fn validate_reports_keyword() {
        let validator = SchemaValidator::with_config(closed_schema(), ValidatorConfig::default()).unwrap();
        let result = validator.validate(&json!({ "a": "x" }));
        assert!(!result.valid);
        assert_eq!(result.errors()[0].keyword, "type");
        assert_eq!(result.errors()[0].schema_path, "#/properties/a/type");
    }

    #[test]
    fn custom_message_is_always_present() {
        let schema = json!({ "type": "string", "x-validation-message": "must be text" });
        let validator = SchemaValidator::with_config(schema, ValidatorConfig::default()).unwrap();
        assert_eq!(validator.validate(&json!("ok")).custom_message.as_deref(), Some("must be text"));
        assert_eq!(validator.validate(&json!(1)).custom_message.as_deref(), Some("must be text"));
    }

    #[test]
    fn pinned_config_is_respected() {
        let schema = json!({ "type": "string", "format": "uuid" });
        let config = ValidatorConfig {
            engine: EngineOptions::default()
                .with_draft(SchemaDraft::Draft7)
                .with_formats(false),
            errors: ErrorOptions::default(),
        };
        let validator = SchemaValidator::with_config(schema, config).unwrap();
        assert!(validator.validate(&json!("not-a-uuid")).valid);
    }

    #[test]
    fn remove_additional_logs_to_callback_first() {
        let validator = SchemaValidator::with_config(closed_schema(), ValidatorConfig::default()).unwrap();

        struct Recorder(RefCell<Vec<String>>);
        impl ErrorLogger for Recorder {
            fn error(&self, message: &str) {
                self.0.borrow_mut().push(message.to_string());
            }
        }

        let logger = Recorder(RefCell::new(Vec::new()));
        let seen = RefCell::new(Vec::new());
        let callback = |message: &str| seen.borrow_mut().push(message.to_string());
        let options = RemoveAdditionalOptions::default()
            .with_logger(&logger)
            .with_error_logger(&callback);

        let mut instance = json!({ "b": 1 });
        validator.remove_additional(&mut instance, &options).unwrap();

        assert_eq!(instance, json!({}));
        assert!(logger.0.borrow().is_empty());
        assert_eq!(
            seen.borrow().as_slice(),
            [r##"Invalid object found when using removeAdditional(): ["#/required: \"a\" is a required property"]"##]
        );
    }

    #[test]
    fn scrub_converts_timestamps() {
        #[derive(Serialize)]
        struct Record {
            a: f64,
            created_at: DateTime<Utc>,
            updated_at: DateTime<Utc>,
            secret: &'static str,
        }
        impl Scrubbable for Record {
            fn timestamps(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
                Some((self.created_at, self.updated_at))
            }
        }

        let schema = json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "a": { "type": "number" },
                "created_at": { "type": "string" },
                "updated_at": { "type": "string" }
            }
        });
        let validator = SchemaValidator::with_config(schema, ValidatorConfig::default()).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let record = Record { a: 1.0, created_at: at, updated_at: at, secret: "x" };

        let scrubbed = validator.scrub(&record, &RemoveAdditionalOptions::strict()).unwrap();
        assert_eq!(
            scrubbed,
            json!({
                "a": 1.0,
                "created_at": "2024-01-02T03:04:05.000Z",
                "updated_at": "2024-01-02T03:04:05.000Z"
            })
        );
    }
}
