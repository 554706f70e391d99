use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

mod agent;
mod error;
mod models;
mod server;
mod session;
mod settings;
mod storage;

use settings::{CliOverrides, EnvDefaults, LoopLimits, ModelParams};

#[derive(Debug, Parser)]
#[command(name = "krishi_agent")]
#[command(about = "Farmer advisory chat agent with tool calling and rollback", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Start {
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: String,
        /// Model id sent to the chat completions endpoint
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        temperature: Option<f32>,
        /// Upper bound on model calls per chat turn
        #[arg(long)]
        max_iterations: Option<u32>,
        #[arg(long)]
        request_timeout_secs: Option<u64>,
        #[arg(long)]
        tool_timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start { listen, model, temperature, max_iterations, request_timeout_secs, tool_timeout_secs } => {
            let addr: SocketAddr = listen.parse()?;
            let overrides = CliOverrides {
                model,
                model_params: Some(ModelParams { temperature, ..ModelParams::default() }),
                limits: Some(LoopLimits { max_iterations, request_timeout_secs, tool_timeout_secs }),
            };
            let settings = settings::resolve_effective_settings(&EnvDefaults::from_env(), &overrides)?;
            if settings.api_key.is_none() {
                tracing::warn!("no LLM_API_KEY or PERPLEXITY_API_KEY set; model calls will be unauthenticated");
            }

            let llm = Arc::new(models::OpenAICompatible::from_settings(&settings)?);
            let engine = agent::ConversationEngine::from_settings(llm, &settings, storage::SessionStore::new())?;
            let metrics = PrometheusBuilder::new().install_recorder()?;
            tracing::info!(model = %settings.model, max_iterations = settings.max_iterations, "engine ready");

            let state = server::AppState { engine: Arc::new(engine), metrics: Some(metrics) };
            server::serve(addr, state).await?;
        }
    }
    Ok(())
}
