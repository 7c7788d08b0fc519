use crate::{
    auth::AuthUser,
    error::AppResult,
    models::{Membership, Registration, UserRef},
    rules::cascade::CascadeReport,
    services::Services,
};
use axum::{
    extract::Query,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest {
    current_password: String,
    new_password: String,
}

#[derive(Deserialize)]
struct ProfileRequest {
    nickname: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClubsQuery {
    #[serde(default)]
    include_pending: bool,
}

async fn me(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<UserRef>> {
    Ok(Json(services.accounts.get(user_id).await?))
}

async fn update_profile(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<ProfileRequest>,
) -> AppResult<Json<UserRef>> {
    Ok(Json(
        services
            .accounts
            .update_profile(user_id, &req.nickname)
            .await?,
    ))
}

async fn change_password(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<PasswordRequest>,
) -> AppResult<Json<()>> {
    services
        .accounts
        .change_password(user_id, &req.current_password, &req.new_password)
        .await?;
    Ok(Json(()))
}

async fn delete_account(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<CascadeReport>> {
    Ok(Json(services.cascades.delete_user(user_id).await?))
}

async fn my_clubs(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ClubsQuery>,
) -> AppResult<Json<Vec<Membership>>> {
    Ok(Json(
        services
            .memberships
            .clubs_of(user_id, query.include_pending)
            .await?,
    ))
}

async fn my_registrations(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<Registration>>> {
    Ok(Json(services.registrations.registrations_of(user_id).await?))
}

pub fn app() -> Router {
    Router::new()
        .route("/", get(me).put(update_profile).delete(delete_account))
        .route("/password", put(change_password))
        .route("/clubs", get(my_clubs))
        .route("/registrations", get(my_registrations))
}
