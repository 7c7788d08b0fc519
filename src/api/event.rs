use crate::{
    auth::AuthUser,
    error::AppResult,
    models::{Event, EventEdit, EventId, NewEvent, Registration, UserId},
    rules::cascade::CascadeReport,
    services::Services,
};
use axum::{
    extract::Path,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;

#[derive(Serialize)]
struct CountResponse {
    confirmed: i64,
}

async fn create(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<NewEvent>,
) -> AppResult<Json<Event>> {
    Ok(Json(services.events.create(user_id, req).await?))
}

async fn info(
    Extension(services): Extension<Services>,
    Path(event_id): Path<EventId>,
) -> AppResult<Json<Event>> {
    Ok(Json(services.events.find(event_id).await?))
}

async fn update(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Path(event_id): Path<EventId>,
    Json(req): Json<EventEdit>,
) -> AppResult<Json<Event>> {
    Ok(Json(services.events.update(user_id, event_id, req).await?))
}

async fn delete(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Path(event_id): Path<EventId>,
) -> AppResult<Json<CascadeReport>> {
    Ok(Json(services.cascades.delete_event(user_id, event_id).await?))
}

async fn register(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Path(event_id): Path<EventId>,
) -> AppResult<Json<Registration>> {
    Ok(Json(services.registrations.register(user_id, event_id).await?))
}

async fn cancel(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Path(event_id): Path<EventId>,
) -> AppResult<Json<Registration>> {
    Ok(Json(services.registrations.cancel(user_id, event_id).await?))
}

async fn participants(
    Extension(services): Extension<Services>,
    Path(event_id): Path<EventId>,
) -> AppResult<Json<Vec<Registration>>> {
    Ok(Json(services.registrations.participants(event_id).await?))
}

async fn count(
    Extension(services): Extension<Services>,
    Path(event_id): Path<EventId>,
) -> AppResult<Json<CountResponse>> {
    let confirmed = services.registrations.confirmed_count(event_id).await?;
    Ok(Json(CountResponse { confirmed }))
}

async fn reject(
    Extension(services): Extension<Services>,
    AuthUser(host_id): AuthUser,
    Path((event_id, participant_id)): Path<(EventId, UserId)>,
) -> AppResult<Json<Registration>> {
    Ok(Json(
        services
            .registrations
            .reject_by_host(host_id, event_id, participant_id)
            .await?,
    ))
}

pub fn app() -> Router {
    Router::new()
        .route("/", post(create))
        .route("/:event_id", get(info).put(update).delete(delete))
        .route("/:event_id/register", post(register))
        .route("/:event_id/cancel", post(cancel))
        .route("/:event_id/participants", get(participants))
        .route("/:event_id/count", get(count))
        .route("/:event_id/participants/:user_id/reject", post(reject))
}
