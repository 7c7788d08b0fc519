use anyhow::Context;
use axum::http::Method;
use envconfig::Envconfig;
use groove_hub::{
    auth::JwtKeys,
    connect_to_db,
    services::Services,
    store::{MemoryStore, PgStore, Store},
};
use std::{net::SocketAddr, str::FromStr, sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown store `{other}`, expected `postgres` or `memory`"),
        }
    }
}

#[derive(Envconfig)]
struct Config {
    #[envconfig(from = "DATABASE_URL")]
    pub db_url: Option<String>,
    #[envconfig(from = "PORT", default = "8080")]
    pub port: u16,
    #[envconfig(from = "STORE", default = "postgres")]
    pub store: StoreKind,
    #[envconfig(from = "JWT_SECRET")]
    pub jwt_secret: String,
    #[envconfig(from = "TOKEN_TTL_SECS", default = "86400")]
    pub token_ttl_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("groove_hub=info,tower_http=info")),
        )
        .init();

    let config = Config::init_from_env()?;
    let keys = JwtKeys::from_base64_secret(
        &config.jwt_secret,
        Duration::from_secs(config.token_ttl_secs),
    )
    .context("JWT_SECRET is not valid base64")?;

    let store: Arc<dyn Store> = match config.store {
        StoreKind::Postgres => {
            let db_url = config
                .db_url
                .context("DATABASE_URL must be set for the postgres store")?;
            Arc::new(PgStore::new(connect_to_db(&db_url)?))
        }
        StoreKind::Memory => {
            tracing::warn!("using the in-memory store, nothing is persisted");
            Arc::new(MemoryStore::new())
        }
    };

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_origin(Any);
    let app = groove_hub::app(Services::new(store), Arc::new(keys))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
