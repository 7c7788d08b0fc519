use crate::{
    auth::JwtKeys,
    error::AppResult,
    models::{User, UserRef},
    services::Services,
};
use axum::{routing::post, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
struct SignupRequest {
    email: String,
    nickname: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizedResponse {
    token: String,
    user: UserRef,
}

impl AuthorizedResponse {
    fn issue(keys: &JwtKeys, user: &User) -> AppResult<Json<Self>> {
        Ok(Json(Self {
            token: keys.generate(user.id)?,
            user: UserRef::from(user),
        }))
    }
}

async fn signup(
    Extension(services): Extension<Services>,
    Extension(keys): Extension<Arc<JwtKeys>>,
    Json(req): Json<SignupRequest>,
) -> AppResult<Json<AuthorizedResponse>> {
    let user = services
        .accounts
        .signup(&req.email, &req.nickname, &req.password)
        .await?;
    AuthorizedResponse::issue(&keys, &user)
}

async fn login(
    Extension(services): Extension<Services>,
    Extension(keys): Extension<Arc<JwtKeys>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthorizedResponse>> {
    let user = services
        .accounts
        .authenticate(&req.email, &req.password)
        .await?;
    AuthorizedResponse::issue(&keys, &user)
}

pub fn app() -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}
