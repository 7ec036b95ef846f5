use clap::{Parser, Subcommand};
use octofhir_fhirmodels::utils::schema_tables_hash;
use octofhir_fhirmodels::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "fhirmodels")]
#[command(about = "Validate and convert FHIR R4 resources against the built-in schemas")]
#[command(version)]
struct Cli {
    /// Configuration file (.yaml, .yml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate one or more resources
    Validate {
        /// Resource files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Wire format (json, xml); guessed from the file extension by default
        #[arg(short, long)]
        format: Option<WireFormat>,
        /// Use the strict validation preset
        #[arg(long)]
        strict: bool,
        /// Report extensible and preferred binding violations as warnings
        #[arg(long)]
        warn_bindings: bool,
        /// Print a plain-text report instead of an OperationOutcome
        #[arg(long)]
        text: bool,
    },
    /// Convert a resource between JSON and XML
    Convert {
        /// Resource file
        input: PathBuf,
        /// Target wire format
        #[arg(short, long)]
        to: WireFormat,
        /// Source wire format; guessed from the file extension by default
        #[arg(long)]
        from: Option<WireFormat>,
        /// Reject unknown elements and choice types instead of preserving them
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        pretty: bool,
    },
    /// Show a registered schema or the field at a dotted path
    Schema {
        /// Type name or path, e.g. Coverage, Coverage.class or ClinicalImpression.effective[x]
        path: String,
    },
    /// List the built-in resource types and their search parameters
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => FhirModelsConfig::from_file(path)?,
        None => FhirModelsConfig::default(),
    };
    let registry = SchemaRegistry::r4();

    match cli.command {
        Commands::Validate {
            files,
            format,
            strict,
            warn_bindings,
            text,
        } => {
            let mut validation = if strict {
                ValidatorConfig::strict()
            } else {
                config.validation.clone()
            };
            if warn_bindings {
                validation = validation.with_advisory_bindings(AdvisoryBindingMode::Warn);
            }
            let codec = ResourceCodec::new(Arc::clone(&registry), &config);

            let mut instances = Vec::with_capacity(files.len());
            for file in &files {
                let format = resolve_format(format, file)?;
                let input = std::fs::read_to_string(file)?;
                instances.push(codec.decode(format, &input, ParseMode::Unchecked)?.instance);
            }

            let validator = Arc::new(StructuralValidator::new(registry).with_config(validation));
            let parallel = ParallelValidator::from_config(validator, &config.performance);
            let results = parallel.validate_batch(instances).await;

            let mut all_valid = true;
            for (file, result) in files.iter().zip(results) {
                let result = result?;
                all_valid &= result.is_valid;
                if text {
                    print_report(file, &result);
                } else {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&result.to_operation_outcome())?
                    );
                }
            }
            Ok(if all_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Convert {
            input,
            to,
            from,
            strict,
            pretty,
        } => {
            let from = resolve_format(from, &input)?;
            let mut config = config;
            if strict {
                config.codec = CodecConfig::strict();
            }
            config.codec.pretty |= pretty;

            let codec = ResourceCodec::new(registry, &config);
            let text = std::fs::read_to_string(&input)?;
            println!("{}", codec.convert(&text, from, to)?);
            info!(input = %input.display(), %from, %to, "Converted resource");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Schema { path } => {
            let json = match registry.find_schema(&path) {
                Some(schema) => serde_json::to_string_pretty(schema.as_ref())?,
                None => serde_json::to_string_pretty(&registry.field_by_path(&path)?)?,
            };
            println!("{json}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            for resource_type in registry.resource_types() {
                let schema = registry.get_schema(&resource_type)?;
                println!("{resource_type}: {}", schema.search_params.join(", "));
            }
            println!(
                "\n{} schemas registered (tables {})",
                registry.len(),
                &schema_tables_hash()[..12]
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_format(explicit: Option<WireFormat>, file: &Path) -> Result<WireFormat> {
    if let Some(format) = explicit {
        return Ok(format);
    }
    file.extension()
        .and_then(|e| e.to_str())
        .and_then(WireFormat::from_extension)
        .ok_or_else(|| FhirModelError::Config {
            message: format!(
                "Cannot tell the wire format of {}; pass --format",
                file.display()
            ),
        })
}

fn print_report(file: &Path, result: &ValidationResult) {
    let status = if result.is_valid { "valid" } else { "invalid" };
    println!(
        "{}: {status} ({} errors, {} warnings)",
        file.display(),
        result.error_count,
        result.warning_count
    );
    for issue in &result.issues {
        println!("  {issue}");
    }
}
