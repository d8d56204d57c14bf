//! warehouse-migrate CLI - export warehouse schemas to artifacts and replay them.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use warehouse_migrate::catalog::{self, SchemaSelection};
use warehouse_migrate::tasks::{self, TaskTarget};
use warehouse_migrate::{
    health_check, Config, ExportOptions, Exporter, ImportOptions, Importer, MemorySession,
    MigrateError, Session, SqlApiSession,
};

#[derive(Parser)]
#[command(name = "warehouse-migrate")]
#[command(about = "Export warehouse schemas to CSV/DDL artifacts and replay them elsewhere")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Programmatic access token (overrides connection.token)
    #[arg(long, env = "SNOWFLAKE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export tables to CSV and DDL artifacts
    Export {
        /// Override source database
        #[arg(long)]
        database: Option<String>,

        /// Schema to export (repeatable)
        #[arg(long = "schema")]
        schemas: Vec<String>,

        /// Export every schema in the database
        #[arg(long, conflicts_with = "schemas")]
        all_schemas: bool,

        /// Maximum rows per table
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Import artifacts into the target database
    Import {
        /// Override target schema for flat artifacts
        #[arg(long)]
        target_schema: Option<String>,

        /// Override the CSV artifact directory
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Truncate each table before loading it
        #[arg(long)]
        truncate: bool,

        /// Dry run: print the statements an import would issue without connecting
        #[arg(long)]
        dry_run: bool,
    },

    /// Capture scheduled task DDL to the tasks file
    ExportTasks {
        /// Override the tasks file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Create tasks from the tasks file or configured definitions
    ImportTasks {
        /// Override the tasks file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// List schemas and tables of a database
    Inventory {
        /// Database to list (default: connection database)
        #[arg(long)]
        database: Option<String>,
    },

    /// Test the warehouse connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    if let Some(token) = cli.token {
        config.connection.token = token;
    }

    match cli.command {
        Commands::Export {
            database,
            schemas,
            all_schemas,
            limit,
        } => {
            let mut options = ExportOptions::from_config(&config)?;
            if let Some(db) = database {
                options.database = db;
            }
            if all_schemas {
                options.schemas = SchemaSelection::All;
            } else if !schemas.is_empty() {
                options.schemas = SchemaSelection::Named(schemas);
            }
            if let Some(n) = limit {
                if n == 0 {
                    return Err(MigrateError::Config("--limit must be at least 1".into()));
                }
                options.limit = Some(n);
            }

            let session = open_session(&config).await?;
            let result = Exporter::new(session.clone(), options).run().await;
            session.close().await;
            let report = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
        }

        Commands::Import {
            target_schema,
            data_dir,
            truncate,
            dry_run,
        } => {
            let mut options = ImportOptions::from_config(&config)?;
            if let Some(schema) = target_schema {
                options.flat_schema = schema;
            }
            if let Some(dir) = data_dir {
                options.data_dir = dir;
            }
            options.truncate_before_load |= truncate;
            options.dry_run = dry_run;

            if dry_run {
                let memory = Arc::new(
                    MemorySession::new().with_account(config.connection.account_identifier()),
                );
                memory.set_bulk_transfer(config.connection.bulk_transfer);
                let report = Importer::new(memory.clone(), options).run().await?;

                if cli.output_json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("Statements:");
                    for statement in memory.statements() {
                        println!("  {}", statement);
                    }
                    println!("{}", report);
                }
                return Ok(());
            }

            let session = open_session(&config).await?;
            let result = Importer::new(session.clone(), options).run().await;
            session.close().await;
            let report = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
        }

        Commands::ExportTasks { file } => {
            let path = file.unwrap_or_else(|| config.tasks.file.clone());
            let session = open_session(&config).await?;
            let result = tasks::capture_tasks(session.as_ref(), config.tasks_database(), &path).await;
            session.close().await;
            let capture = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&capture)?);
            } else {
                println!(
                    "Captured {} task(s) to {} ({} skipped)",
                    capture.captured.len(),
                    path.display(),
                    capture.skipped.len()
                );
                for (task, cause) in &capture.skipped {
                    println!("  {}: skipped ({})", task, cause);
                }
            }
        }

        Commands::ImportTasks { file } => {
            let path = file.unwrap_or_else(|| config.tasks.file.clone());
            let target = TaskTarget {
                database: config.tasks_database().to_string(),
                schema: config.tasks_schema().to_string(),
                warehouse: config.connection.warehouse.clone(),
            };
            let session = open_session(&config).await?;
            let result =
                tasks::replay_tasks(session.as_ref(), &path, &config.tasks.definitions, &target).await;
            session.close().await;
            let replay = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&replay)?);
            } else {
                for (task, cause) in &replay.failed {
                    println!("  {}: failed ({})", task, cause);
                }
                println!(
                    "Created {} task(s) from {:?} ({} failed). Tasks start suspended.",
                    replay.created.len(),
                    replay.source,
                    replay.failed.len()
                );
            }
        }

        Commands::Inventory { database } => {
            let database = database.unwrap_or_else(|| config.connection.database.clone());
            let session = open_session(&config).await?;
            let result = catalog::inventory(session.as_ref(), &database).await;
            session.close().await;
            let walk = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&walk)?);
            } else {
                println!("{}", walk);
            }
        }

        Commands::HealthCheck => {
            let session = SqlApiSession::new(&config.connection)?;
            let result = health_check(&session).await;
            session.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Account {}: {} ({}ms)",
                    result.account,
                    if result.connected { "OK" } else { "FAILED" },
                    result.latency_ms
                );
                for (label, value) in [
                    ("User", &result.user),
                    ("Role", &result.role),
                    ("Warehouse", &result.warehouse),
                    ("Database", &result.database),
                    ("Schema", &result.schema),
                ] {
                    if let Some(value) = value {
                        println!("    {}: {}", label, value);
                    }
                }
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Connectivity("health check failed".to_string()));
            }
        }
    }

    Ok(())
}

async fn open_session(config: &Config) -> Result<Arc<dyn Session>, MigrateError> {
    let session = SqlApiSession::connect(&config.connection).await?;
    info!("Connected to account {}", session.account());
    Ok(Arc::new(session))
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Reports go to stdout; keep logs off it.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}' (expected text or json)", other)),
    }

    Ok(())
}
