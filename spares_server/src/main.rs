mod handlers;
mod route;

use crate::route::create_router;
use axum::http::{Method, header::CONTENT_TYPE};
use clap::Parser;
use spares::config::{CoreConfig, Environment, get_env_config};
use sqlx::{
    Sqlite,
    migrate::{MigrateDatabase, Migrator},
    sqlite::{SqlitePool, SqlitePoolOptions},
};
use std::{path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: CoreConfig,
}

async fn start_server(args: Args) -> Result<(), String> {
    let env_config = get_env_config(args.environment);
    let core_config = CoreConfig::from_env().map_err(|e| e.to_string())?;

    let mut database_already_exists = false;
    if Sqlite::database_exists(env_config.database_url.as_str())
        .await
        .unwrap_or(false)
    {
        log::info!("database already exists, skipping creation");
        database_already_exists = true;
    } else {
        log::info!("creating database at {}", env_config.database_url);
        Sqlite::create_database(env_config.database_url.as_str())
            .await
            .map_err(|e| e.to_string())?;
    }

    let pool = SqlitePoolOptions::new()
        .max_lifetime(None)
        .idle_timeout(None)
        .connect(&env_config.database_url)
        .await
        .map_err(|e| format!("failed to connect to the database: {e:?}"))?;
    log::info!("connected to the database");

    if !database_already_exists {
        let crate_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
        let mut migrations_path = PathBuf::from(&crate_dir);
        migrations_path.push("..");
        migrations_path.push("spares");
        migrations_path.push("migrations");
        Migrator::new(migrations_path)
            .await
            .unwrap()
            .run(&pool)
            .await
            .map_err(|e| format!("failed to migrate the database: {e:?}"))?;
        log::info!("migration successful");
    }

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(Any)
        .allow_headers([CONTENT_TYPE, axum::http::header::AUTHORIZATION]);
    let app_state = Arc::new(AppState { db: pool, config: core_config });
    let app = create_router(app_state).layer(cors);
    let listener = TcpListener::bind(&env_config.socket_address)
        .await
        .map_err(|e| format!("failed to bind {}: {e}", env_config.socket_address))?;
    log::info!("listening on {}", env_config.socket_address);
    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// Spares core server: scheduling, review log and relationship API.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = Environment::Production)]
    environment: Environment,
}

#[tokio::main(worker_threads = 5)]
async fn main() {
    env_logger::init();

    let args = Args::parse();
    if let Err(e) = start_server(args).await {
        log::error!("{e}");
        std::process::exit(1);
    }
}
