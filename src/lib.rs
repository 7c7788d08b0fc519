use axum::{Extension, Router};
use deadpool::managed::Pool;
use diesel_async::{pooled_connection::AsyncDieselConnectionManager, AsyncPgConnection};
use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod error;
pub mod models;
pub mod rules;
pub mod schema;
pub mod services;
pub mod store;

pub type DbPool = Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

pub fn connect_to_db(db_url: &str) -> anyhow::Result<DbPool> {
    let db_config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);
    Pool::builder(db_config)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build database pool: {e}"))
}

pub fn app(services: services::Services, keys: Arc<auth::JwtKeys>) -> Router {
    Router::new()
        .nest("/api", api::app())
        .layer(Extension(services))
        .layer(Extension(keys))
}
