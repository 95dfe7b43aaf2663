use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use intel_gather::{
    build_state,
    config::Config,
    frontend::{create_frontend_router, ApiClient, FrontendState},
    routes::create_router,
    utils::init_logging,
};

#[derive(Parser)]
#[command(name = "intel-gather", version, about = "Multi-agent intelligence gathering service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the investigation API only
    Api,
    /// Run the chat frontend only
    Frontend,
    /// Run both services in one process
    All,
}

async fn serve_api(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = build_state(config)?;
    info!(
        provider = %state.config.llm.provider,
        model = %state.config.llm.default_model,
        "Investigation API listening on {}", addr
    );

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, create_router(state))
        .await
        .map_err(|e| anyhow::anyhow!("API server error: {}", e))
}

async fn serve_frontend(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.frontend.host, config.frontend.port);
    let api = ApiClient::new(&config.frontend)?;
    let app = create_frontend_router(FrontendState::new(api), &config);
    info!(api_url = %config.frontend.api_url, "Chat frontend listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Frontend server error: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let _log_guard = init_logging(&config.logging);

    match cli.command.unwrap_or(Command::All) {
        Command::Api => serve_api(config).await,
        Command::Frontend => serve_frontend(config).await,
        Command::All => {
            tokio::try_join!(serve_api(config.clone()), serve_frontend(config))?;
            Ok(())
        }
    }
}
