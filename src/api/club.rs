use crate::{
    auth::AuthUser,
    error::AppResult,
    models::{Club, ClubEdit, ClubId, ClubRole, Membership, MembershipStatus, NewClub, UserId},
    rules::cascade::CascadeReport,
    services::Services,
};
use axum::{
    extract::Path,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedClubResponse {
    club: Club,
    leader: Membership,
}

#[derive(Serialize)]
struct StatusResponse {
    status: MembershipStatus,
}

#[derive(Deserialize)]
struct RoleRequest {
    role: ClubRole,
}

async fn create(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<NewClub>,
) -> AppResult<Json<CreatedClubResponse>> {
    let (club, leader) = services.clubs.create(user_id, req).await?;
    Ok(Json(CreatedClubResponse { club, leader }))
}

async fn info(
    Extension(services): Extension<Services>,
    Path(club_id): Path<ClubId>,
) -> AppResult<Json<Club>> {
    Ok(Json(services.clubs.find(club_id).await?))
}

async fn update(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Path(club_id): Path<ClubId>,
    Json(req): Json<ClubEdit>,
) -> AppResult<Json<Club>> {
    Ok(Json(services.clubs.update(user_id, club_id, req).await?))
}

async fn delete(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Path(club_id): Path<ClubId>,
) -> AppResult<Json<CascadeReport>> {
    Ok(Json(services.cascades.delete_club(user_id, club_id).await?))
}

async fn members(
    Extension(services): Extension<Services>,
    Path(club_id): Path<ClubId>,
) -> AppResult<Json<Vec<Membership>>> {
    Ok(Json(services.memberships.active_members(club_id).await?))
}

async fn applications(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Path(club_id): Path<ClubId>,
) -> AppResult<Json<Vec<Membership>>> {
    Ok(Json(
        services
            .memberships
            .pending_applications(user_id, club_id)
            .await?,
    ))
}

async fn my_status(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Path(club_id): Path<ClubId>,
) -> AppResult<Json<StatusResponse>> {
    let status = services.memberships.status(user_id, club_id).await?;
    Ok(Json(StatusResponse { status }))
}

async fn apply(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Path(club_id): Path<ClubId>,
) -> AppResult<Json<Membership>> {
    Ok(Json(services.memberships.apply(user_id, club_id).await?))
}

async fn cancel(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Path(club_id): Path<ClubId>,
) -> AppResult<Json<Membership>> {
    Ok(Json(services.memberships.cancel(user_id, club_id).await?))
}

async fn leave(
    Extension(services): Extension<Services>,
    AuthUser(user_id): AuthUser,
    Path(club_id): Path<ClubId>,
) -> AppResult<Json<Membership>> {
    Ok(Json(services.memberships.leave(user_id, club_id).await?))
}

async fn approve(
    Extension(services): Extension<Services>,
    AuthUser(manager_id): AuthUser,
    Path((club_id, target_id)): Path<(ClubId, UserId)>,
) -> AppResult<Json<Membership>> {
    Ok(Json(
        services
            .memberships
            .approve(manager_id, club_id, target_id)
            .await?,
    ))
}

async fn reject(
    Extension(services): Extension<Services>,
    AuthUser(manager_id): AuthUser,
    Path((club_id, target_id)): Path<(ClubId, UserId)>,
) -> AppResult<Json<Membership>> {
    Ok(Json(
        services
            .memberships
            .reject(manager_id, club_id, target_id)
            .await?,
    ))
}

async fn kick(
    Extension(services): Extension<Services>,
    AuthUser(manager_id): AuthUser,
    Path((club_id, target_id)): Path<(ClubId, UserId)>,
) -> AppResult<Json<Membership>> {
    Ok(Json(
        services
            .memberships
            .kick(manager_id, club_id, target_id)
            .await?,
    ))
}

async fn change_role(
    Extension(services): Extension<Services>,
    AuthUser(leader_id): AuthUser,
    Path((club_id, target_id)): Path<(ClubId, UserId)>,
    Json(req): Json<RoleRequest>,
) -> AppResult<Json<Membership>> {
    Ok(Json(
        services
            .memberships
            .change_role(leader_id, club_id, target_id, req.role)
            .await?,
    ))
}

async fn transfer(
    Extension(services): Extension<Services>,
    AuthUser(leader_id): AuthUser,
    Path((club_id, target_id)): Path<(ClubId, UserId)>,
) -> AppResult<Json<Membership>> {
    Ok(Json(
        services
            .memberships
            .transfer_leadership(leader_id, club_id, target_id)
            .await?,
    ))
}

pub fn app() -> Router {
    Router::new()
        .route("/", post(create))
        .route("/:club_id", get(info).put(update).delete(delete))
        .route("/:club_id/members", get(members))
        .route("/:club_id/applications", get(applications))
        .route("/:club_id/membership", get(my_status))
        .route("/:club_id/apply", post(apply))
        .route("/:club_id/cancel", post(cancel))
        .route("/:club_id/leave", post(leave))
        .route("/:club_id/members/:user_id/approve", post(approve))
        .route("/:club_id/members/:user_id/reject", post(reject))
        .route("/:club_id/members/:user_id/kick", post(kick))
        .route("/:club_id/members/:user_id/role", put(change_role))
        .route("/:club_id/members/:user_id/transfer", post(transfer))
}
