//! Schema DTO CLI
//!
//! Command-line interface for generating normalized schemas from OpenAPI
//! documents and for validating or scrubbing payloads against a schema.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use schema_dto::{
    generate_batch, load_document_auto, load_payload, set_engine_options, set_error_options,
    EngineOptions, ErrorOptions, GenerateConfig, JsonFileEmitter, RemoveAdditionalOptions,
    SchemaDraft, SchemaValidator, DEFAULT_SCHEMAS_PATH,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-dto")]
#[command(about = "Normalize OpenAPI schemas and validate payloads against them")]
#[command(version)]
struct Cli {
    /// Log debug details to stderr (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate normalized schema files from OpenAPI documents
    Generate {
        /// Document sources: file paths or URLs (http:// or https://)
        #[arg(required = true)]
        documents: Vec<String>,

        /// Output directory; each document gets its own subdirectory
        #[arg(long, short)]
        output: PathBuf,

        /// JSON Pointer of the object holding named schemas
        #[arg(long, default_value = DEFAULT_SCHEMAS_PATH)]
        schemas_path: String,

        /// Extract request/response body schemas per operation instead
        #[arg(long)]
        operations: bool,

        /// Replace reference cycles with generic object schemas
        #[arg(long)]
        remove_circular: bool,

        /// Do not write index.json
        #[arg(long)]
        skip_index: bool,
    },

    /// Validate a payload against a schema
    Validate {
        /// Schema source: file path or URL
        schema: String,

        /// Payload file to validate
        payload: PathBuf,

        /// Drop type-null branch errors of nullable oneOf/anyOf
        #[arg(long)]
        omit_null_siblings: bool,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Remove undeclared properties from a payload
    Scrub {
        /// Schema source: file path or URL
        schema: String,

        /// Payload file to scrub
        payload: PathBuf,

        /// Fail if the payload is still invalid after scrubbing
        #[arg(long)]
        strict: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(clap::Args)]
struct EngineArgs {
    /// JSON Schema draft used to compile the schema
    #[arg(long, value_enum, default_value_t = SchemaDraft::Draft202012)]
    draft: SchemaDraft,

    /// Treat `format` as an annotation only
    #[arg(long)]
    no_formats: bool,
}

impl EngineArgs {
    fn apply(&self) {
        set_engine_options(
            EngineOptions::default()
                .with_draft(self.draft)
                .with_formats(!self.no_formats),
        );
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Generate {
            documents,
            output,
            schemas_path,
            operations,
            remove_circular,
            skip_index,
        } => {
            let config = GenerateConfig::default()
                .with_schemas_path(schemas_path)
                .with_operations(operations)
                .with_remove_circular(remove_circular)
                .with_skip_index(skip_index);
            run_generate(&documents, output, &config)
        }

        Commands::Validate {
            schema,
            payload,
            omit_null_siblings,
            json,
            engine,
        } => {
            engine.apply();
            set_error_options(ErrorOptions::default().with_omit_null_sibling_errors(omit_null_siblings));
            run_validate(&schema, &payload, json)
        }

        Commands::Scrub {
            schema,
            payload,
            strict,
            pretty,
            output,
            engine,
        } => {
            engine.apply();
            run_scrub(&schema, &payload, strict, pretty, output)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_generate(documents: &[String], output: PathBuf, config: &GenerateConfig) -> Result<(), u8> {
    let mut emitter = JsonFileEmitter::new(output);
    let batch = generate_batch(documents, config, &mut emitter);

    for report in &batch.documents {
        for failed in &report.failed {
            eprintln!("  {} {}: {}", report.document, failed.name, failed.reason);
        }
        for info in &report.circular_refs {
            eprintln!(
                "  {} circular reference {} -> {}",
                report.document, info.reference, info.original
            );
        }
    }
    for (source, error) in &batch.failed_documents {
        eprintln!("Error: {}: {}", source, error);
    }

    println!(
        "{} schema(s) generated, {} failed",
        batch.generated_count(),
        batch.failed_count()
    );

    match batch.exit_code() {
        0 => Ok(()),
        code => Err(code as u8),
    }
}

fn load_validator(schema_source: &str, json_output: bool) -> Result<SchemaValidator, u8> {
    let schema = load_document_auto(schema_source).map_err(|e| {
        report_error(json_output, &format!("loading schema: {}", e));
        e.exit_code() as u8
    })?;
    SchemaValidator::new(schema).map_err(|e| {
        report_error(json_output, &e.to_string());
        2
    })
}

fn read_payload(path: &Path, json_output: bool) -> Result<Value, u8> {
    load_payload(path).map_err(|e| {
        report_error(json_output, &format!("loading payload: {}", e));
        e.exit_code() as u8
    })
}

fn run_validate(schema_source: &str, payload_path: &Path, json_output: bool) -> Result<(), u8> {
    let validator = load_validator(schema_source, json_output)?;
    let payload = read_payload(payload_path, json_output)?;

    let result = validator.validate(&payload);
    if json_output {
        println!(
            "{}",
            serde_json::to_string(&result).map_err(|e| {
                eprintln!("Error serializing output: {}", e);
                2u8
            })?
        );
    } else if result.valid {
        println!("Valid");
    } else {
        eprintln!("Validation failed:");
        for error in result.errors() {
            eprintln!("  {} at '{}'", error, error.instance_path);
        }
        if let Some(message) = &result.custom_message {
            eprintln!("  {}", message);
        }
    }

    if result.valid {
        Ok(())
    } else {
        Err(1)
    }
}

fn run_scrub(
    schema_source: &str,
    payload_path: &Path,
    strict: bool,
    pretty: bool,
    output: Option<PathBuf>,
) -> Result<(), u8> {
    let validator = load_validator(schema_source, false)?;
    let payload = read_payload(payload_path, false)?;

    let warn = |message: &str| eprintln!("Warning: {}", message);
    let options = RemoveAdditionalOptions {
        strict,
        ..RemoveAdditionalOptions::default()
    }
    .with_error_logger(&warn);

    let scrubbed = validator.scrub(&payload, &options).map_err(|e| {
        eprintln!("Error: {}", e);
        if let schema_dto::ScrubError::RemoveAdditional(inner) = &e {
            for error in &inner.validation_errors {
                eprintln!("  {}", error);
            }
        }
        1u8
    })?;

    let rendered = if pretty {
        serde_json::to_string_pretty(&scrubbed)
    } else {
        serde_json::to_string(&scrubbed)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(&path, &rendered).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", rendered);
        }
    }

    Ok(())
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
