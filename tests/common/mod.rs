#![allow(dead_code, clippy::unwrap_used)]

use chrono::{Duration, Utc};
use groove_hub::{
    models::{ClubId, ClubType, EventId, EventKind, NewClub, NewEvent, NewUser, Scope, UserId},
    services::Services,
    store::{MemoryStore, Store},
};
use std::sync::Arc;

pub struct World {
    pub store: Arc<MemoryStore>,
    pub services: Services,
}

pub fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    let services = Services::new(store.clone() as Arc<dyn Store>);
    World { store, services }
}

impl World {
    /// Inserts an account directly, skipping password hashing.
    pub async fn user(&self, nickname: &str) -> UserId {
        self.store
            .insert_user(NewUser {
                email: format!("{nickname}@groove.io"),
                nickname: nickname.to_string(),
                password_hash: String::new(),
            })
            .await
            .unwrap()
            .id
    }

    pub async fn club(&self, leader: UserId, name: &str) -> ClubId {
        let (club, _) = self
            .services
            .clubs
            .create(
                leader,
                NewClub {
                    club_name: name.to_string(),
                    club_type: ClubType::Crew,
                    intro: "popping and locking".into(),
                    description: "weekly sessions".into(),
                    location_name: "Studio 4".into(),
                },
            )
            .await
            .unwrap();
        club.id
    }

    pub async fn member(&self, club: ClubId, leader: UserId, nickname: &str) -> UserId {
        let user = self.user(nickname).await;
        self.services.memberships.apply(user, club).await.unwrap();
        self.services
            .memberships
            .approve(leader, club, user)
            .await
            .unwrap();
        user
    }

    pub async fn event(&self, host: UserId, club: Option<ClubId>, capacity: i32) -> EventId {
        let starts_at = Utc::now().naive_utc() + Duration::days(7);
        self.services
            .events
            .create(
                host,
                NewEvent {
                    host_id: 0,
                    scope: if club.is_some() { Scope::Club } else { Scope::Global },
                    club_id: club,
                    kind: EventKind::Battle,
                    title: "2vs2 battle".into(),
                    content: "bring your crew".into(),
                    location_name: Some("Warehouse".into()),
                    capacity,
                    starts_at,
                    ends_at: starts_at + Duration::hours(4),
                },
            )
            .await
            .unwrap()
            .id
    }
}
