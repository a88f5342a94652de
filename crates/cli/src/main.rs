mod commands;
mod config;
mod forms;
mod input;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use formflow_engine::Identity;
use formflow_interchange::Id;

use crate::commands::check::cmd_check;
use crate::commands::submit::{cmd_submit, SubmitOptions};
use crate::config::Config;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Multi-stage form submission engine.
#[derive(Parser)]
#[command(name = "formflow", version, about = "Multi-stage form submission engine")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Path to a formflow.toml configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Port to listen on (overrides the configuration)
        #[arg(long)]
        port: Option<u16>,
        /// Directory of form-version JSON documents to preload
        #[arg(long)]
        forms_dir: Option<PathBuf>,
    },

    /// Load a form-version document and report configuration problems
    Check {
        /// Path to the form-version JSON document
        form: PathBuf,
        /// Exit with status 1 when there are warnings
        #[arg(long)]
        strict: bool,
    },

    /// Submit values to the initial stage of a form, in memory
    Submit {
        /// Path to the form-version JSON document
        form: PathBuf,
        /// Path to a JSON file of field values
        #[arg(long)]
        values: Option<PathBuf>,
        /// Stage transition to apply after saving
        #[arg(long)]
        transition: Option<Id>,
        /// Submit as this user id (guest when omitted)
        #[arg(long)]
        user_id: Option<Id>,
        /// Email of the submitting user
        #[arg(long, requires = "user_id")]
        user_email: Option<String>,
        /// Comma-separated role ids of the submitting user
        #[arg(long, value_delimiter = ',', requires = "user_id")]
        roles: Vec<Id>,
        /// Where uploaded files are written
        #[arg(long, default_value = "./storage")]
        blob_root: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            forms_dir,
        } => {
            let mut config = match Config::load(config.as_deref()) {
                Ok(c) => c,
                Err(e) => {
                    report_error(&e.to_string(), cli.output, cli.quiet);
                    process::exit(1);
                }
            };
            if let Some(port) = port {
                config.port = port;
            }
            if forms_dir.is_some() {
                config.forms_dir = forms_dir;
            }
            init_logging(&config.log_filter);

            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    let msg = format!("failed to create tokio runtime: {}", e);
                    report_error(&msg, cli.output, cli.quiet);
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(config)) {
                report_error(&format!("server error: {}", e), cli.output, cli.quiet);
                process::exit(1);
            }
        }
        Commands::Check { form, strict } => {
            init_logging("warn");
            cmd_check(&form, strict, cli.output, cli.quiet);
        }
        Commands::Submit {
            form,
            values,
            transition,
            user_id,
            user_email,
            roles,
            blob_root,
        } => {
            init_logging("warn");
            let identity = user_id.map(|id| {
                Identity::new(id, user_email.unwrap_or_default()).with_roles(roles)
            });
            cmd_submit(SubmitOptions {
                form: &form,
                values: values.as_deref(),
                transition,
                identity,
                blob_root,
                output: cli.output,
                quiet: cli.quiet,
            });
        }
    }
}

/// Log to stderr. `RUST_LOG` wins over `default_filter`.
fn init_logging(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
