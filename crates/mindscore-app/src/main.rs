//! mindscore command-line front end
//!
//! Trains attention/memory models and scores fresh EEG for a caller
//! identity, printing the same JSON envelope a request handler returns.
//!
//! # Usage
//!
//! ```bash
//! # Train every model routed for the project
//! mindscore train --name session-1 --org-id org --user-id user --project-name focus
//!
//! # Score the latest data with the model routed for a label
//! mindscore predict --name session-1 --org-id org --user-id user --project-name focus --label attention
//!
//! # Check a stored artifact against its checksum
//! mindscore verify "/srv/mindscore/models/attention.<hash>.model,<sha256>"
//!
//! # List trained models
//! mindscore models --name session-1 --org-id org --user-id user --project-name focus
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mindscore_core::protocol::{ModelReference, Response};
use mindscore_native::service::identity_from_value;
use mindscore_native::{CancellationToken, MindscoreService, ServiceConfig};

/// mindscore EEG scoring backend
#[derive(Parser, Debug)]
#[command(name = "mindscore")]
#[command(author, version, about = "EEG attention and memory scoring", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Configuration file (defaults to MINDSCORE_CONFIG_PATH or ./mindscore.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the project directory holding models, dumps and the registry
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Override the EEG data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Caller identity
#[derive(Args, Debug)]
struct Identity {
    /// Session or subject name
    #[arg(long)]
    name: String,

    /// Organisation ID
    #[arg(long)]
    org_id: String,

    /// User ID
    #[arg(long)]
    user_id: String,

    /// Project name
    #[arg(long)]
    project_name: String,
}

impl Identity {
    fn to_body(&self) -> Value {
        json!({
            "name": self.name,
            "org_id": self.org_id,
            "user_id": self.user_id,
            "project_name": self.project_name,
        })
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train every model routed for the project
    Train {
        #[command(flatten)]
        identity: Identity,
    },

    /// Score the latest data with the model routed for a label
    Predict {
        #[command(flatten)]
        identity: Identity,

        /// Label routed to a model
        #[arg(long)]
        label: String,

        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Override the retry bound
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Check a stored model against its checksum
    Verify {
        /// Model reference, "<path>,<checksum>"
        reference: String,
    },

    /// List models trained for an identity
    Models {
        #[command(flatten)]
        identity: Identity,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("mindscore v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ServiceConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = cli.project_dir {
        config.project.dir = dir;
    }
    if let Some(dir) = cli.data_dir {
        config.data.dir = dir;
    }

    match cli.command {
        Commands::Train { identity } => {
            let service = MindscoreService::from_config(config).context("failed to start service")?;
            print_response(&service.handle_train(&identity.to_body()))
        }
        Commands::Predict {
            identity,
            label,
            timeout_secs,
            max_attempts,
        } => {
            if let Some(attempts) = max_attempts {
                config.retry.max_attempts = attempts;
            }
            let service = MindscoreService::from_config(config).context("failed to start service")?;

            let mut body = identity.to_body();
            body["label_content"] = json!(label);
            let deadline = timeout_secs.map(|secs| Instant::now() + Duration::from_secs(secs));

            print_response(&service.handle_predict(&body, &CancellationToken::new(), deadline))
        }
        Commands::Verify { reference } => {
            let reference: ModelReference = reference.parse().context("invalid model reference")?;
            let service = MindscoreService::from_config(config).context("failed to start service")?;
            service.verify(&reference)?;
            println!("{} OK", reference.path().display());
            Ok(())
        }
        Commands::Models { identity } => {
            let service = MindscoreService::from_config(config).context("failed to start service")?;
            let info = identity_from_value(&identity.to_body())?;
            let models = service.models(&info)?;
            println!("{}", serde_json::to_string_pretty(&models)?);
            Ok(())
        }
    }
}

/// Print the envelope; an error envelope also fails the process
fn print_response(response: &Response<Value>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    if !response.is_success() {
        bail!("request failed");
    }
    Ok(())
}
