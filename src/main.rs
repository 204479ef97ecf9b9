use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use feed::auth::session;
use feed::config::{Cli, Command, Config};
use feed::db;
use feed::db::repository::{FeedRepository, SqliteFeedRepository};
use feed::routes;
use feed::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure uploads directory exists
    std::fs::create_dir_all(config.uploads_path())?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    match cli.command.clone().unwrap_or(Command::Serve) {
        Command::AddUser { name } => {
            let repo = SqliteFeedRepository::new(pool.clone());
            let user = repo.create_user(&name).await?;
            let token = session::create_session(&pool, &user.id, config.auth.session_hours)?;
            tracing::info!(user = %user.id, "Created user {}", user.name);
            println!("user_id: {}", user.id);
            println!("token:   {}", token);
            Ok(())
        }
        Command::Serve => serve(AppState::new(pool, config)).await,
    }
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr =
        format!("{}:{}", state.config.server.host, state.config.server.port).parse()?;
    let app = routes::app(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
