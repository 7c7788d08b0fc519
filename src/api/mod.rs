use axum::Router;

pub mod account;
pub mod auth;
pub mod club;
pub mod event;

pub fn app() -> Router {
    Router::new()
        .nest("/auth", auth::app())
        .nest("/account", account::app())
        .nest("/club", club::app())
        .nest("/event", event::app())
}
