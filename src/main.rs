use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use guardrail_panel::address::AddressError;
use guardrail_panel::batch::BatchPrinter;
use guardrail_panel::config::{ConfigError, PanelConfig};
use guardrail_panel::rpc::JsonRpcReader;
use guardrail_panel::sink::{Session, SinkError, StaticSession, SystemClock};
use guardrail_panel::{Address, Collaborators, DelegateIntent, ErrorCode, GuardrailPanel, PanelError, PanelView};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),
    #[error("{0}")]
    Sink(#[from] SinkError),
    #[error("{0}")]
    Panel(#[from] PanelError),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "guardrail-panel", about = "Inspect and operate the Safe guardrail")]
struct Cli {
    /// Safe to operate on; overrides `GUARDRAIL_SAFE_ADDRESS`.
    #[arg(long)]
    safe: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the panel view as JSON.
    Status,
    /// Write the activation batch.
    Activate,
    /// Write the removal scheduling batch.
    ScheduleRemoval,
    /// Write the deactivation batch once removal is due.
    Deactivate,
    /// Grant a delegate allowance (scheduled while the guard is active).
    Grant {
        delegate: String,
        #[arg(long)]
        once: bool,
    },
    /// Reset a registered delegate's allowance.
    Reset { delegate: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "guardrail-panel failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = PanelConfig::from_env()?;
    let safe = match cli.safe.as_deref() {
        Some(raw) => Some(raw.parse::<Address>()?),
        None => config.safe_address,
    };
    let session = safe.map(|safe_address| Session { safe_address, chain_id: config.chain_id });

    let reader = JsonRpcReader::new(config.require_rpc_url()?, config.timeouts)?;
    let panel = GuardrailPanel::new(
        config.contracts,
        Collaborators {
            reader: Arc::new(reader),
            transactions: Arc::new(BatchPrinter::stdout(config.chain_id, safe)),
            session: Arc::new(StaticSession(session)),
            clock: Arc::new(SystemClock),
        },
    );

    // Status still renders after a failed refresh; the error is in the view.
    if let Err(e) = panel.refresh().await {
        tracing::warn!(error = %e, retryable = e.retryable(), "refresh incomplete");
    }

    match cli.command.unwrap_or(Command::Status) {
        Command::Status => {
            let view = PanelView::project(&panel.snapshot(), panel.now_secs());
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Activate => panel.activate().await?,
        Command::ScheduleRemoval => panel.schedule_removal().await?,
        Command::Deactivate => panel.deactivate().await?,
        Command::Grant { delegate, once } => {
            panel
                .grant_or_schedule_delegate_allowance(delegate.parse()?, DelegateIntent::Grant { once })
                .await?;
        }
        Command::Reset { delegate } => {
            panel.schedule_delegate_allowance(delegate.parse()?, DelegateIntent::Reset).await?;
        }
    }
    Ok(())
}
