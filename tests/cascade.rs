#![allow(clippy::unwrap_used)]

mod common;

use groove_hub::{
    error::CoreError,
    models::{MembershipStatus, RegistrationStatus},
    rules::cascade::CascadeStep,
    store::Store,
};
use std::sync::Arc;

#[tokio::test]
async fn club_deletion_cancels_memberships_and_club_event_registrations() {
    let world = common::world();
    let leader = world.user("leader").await;
    let club = world.club(leader, "Wavers").await;
    let member = world.member(club, leader, "member").await;
    let applicant = world.user("applicant").await;
    world.services.memberships.apply(applicant, club).await.unwrap();
    let club_event = world.event(leader, Some(club), 10).await;
    let open_event = world.event(leader, None, 10).await;
    world.services.registrations.register(member, club_event).await.unwrap();
    world.services.registrations.register(member, open_event).await.unwrap();

    let report = world.services.cascades.delete_club(leader, club).await.unwrap();
    assert_eq!(report.memberships, 3);
    assert_eq!(report.registrations, 1);
    assert_eq!((report.events, report.clubs), (1, 1));

    for user in [leader, member, applicant] {
        let row = world.store.find_membership(user, club).await.unwrap().unwrap();
        assert_eq!(row.status, MembershipStatus::Canceled);
    }
    assert_eq!(
        world.services.registrations.status(member, club_event).await.unwrap(),
        RegistrationStatus::Canceled
    );
    assert_eq!(
        world.services.registrations.status(member, open_event).await.unwrap(),
        RegistrationStatus::Confirmed
    );
    assert!(!world.services.clubs.get(club).await.unwrap().is_live());
    assert!(matches!(
        world.services.registrations.register(member, club_event).await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn a_failed_club_cascade_changes_nothing() {
    let world = common::world();
    let leader = world.user("leader").await;
    let club = world.club(leader, "Voguers").await;
    let member = world.member(club, leader, "member").await;
    let event = world.event(leader, Some(club), 10).await;
    world.services.registrations.register(member, event).await.unwrap();

    world
        .store
        .fail_cascade_at(CascadeStep::ClubEvents { club_id: club })
        .unwrap();
    let result = world.services.cascades.delete_club(leader, club).await;
    assert!(matches!(result, Err(CoreError::Fatal(_))));

    assert_eq!(
        world.services.memberships.status(member, club).await.unwrap(),
        MembershipStatus::Active
    );
    assert_eq!(
        world.services.registrations.status(member, event).await.unwrap(),
        RegistrationStatus::Confirmed
    );
    assert!(world.services.clubs.get(club).await.unwrap().is_live());
    assert!(world.services.events.get(event).await.unwrap().exists);

    // the fault fires once, a retry goes through
    world.services.cascades.delete_club(leader, club).await.unwrap();
}

#[tokio::test]
async fn only_the_leader_deletes_a_club() {
    let world = common::world();
    let leader = world.user("leader").await;
    let club = world.club(leader, "Tutters").await;
    let member = world.member(club, leader, "member").await;

    assert!(matches!(
        world.services.cascades.delete_club(member, club).await,
        Err(CoreError::Forbidden(_))
    ));
    assert!(world.services.clubs.get(club).await.unwrap().is_live());
}

#[tokio::test]
async fn leaders_must_hand_over_before_deleting_their_account() {
    let world = common::world();
    let leader = world.user("leader").await;
    let club = world.club(leader, "Jookers").await;
    let heir = world.member(club, leader, "heir").await;

    assert!(matches!(
        world.services.cascades.delete_user(leader).await,
        Err(CoreError::InvalidOperation(_))
    ));
    assert!(world.services.accounts.exists(leader).await.unwrap());

    world
        .services
        .memberships
        .transfer_leadership(leader, club, heir)
        .await
        .unwrap();
    world.services.cascades.delete_user(leader).await.unwrap();

    assert!(!world.services.accounts.exists(leader).await.unwrap());
    assert_eq!(
        world.services.memberships.status(leader, club).await.unwrap(),
        MembershipStatus::Left
    );
}

#[tokio::test]
async fn user_deletion_closes_registrations_and_hosted_events() {
    let world = common::world();
    let host = world.user("host").await;
    let dancer = world.user("dancer").await;
    let hosted = world.event(host, None, 4).await;
    let elsewhere = world.event(dancer, None, 4).await;
    world.services.registrations.register(dancer, hosted).await.unwrap();
    world.services.registrations.register(host, elsewhere).await.unwrap();

    let report = world.services.cascades.delete_user(host).await.unwrap();
    assert_eq!(report.users, 1);
    assert_eq!(report.events, 1);
    assert_eq!(report.registrations, 2);

    assert_eq!(
        world.services.registrations.status(dancer, hosted).await.unwrap(),
        RegistrationStatus::Canceled
    );
    assert_eq!(
        world.services.registrations.status(host, elsewhere).await.unwrap(),
        RegistrationStatus::Canceled
    );
    assert!(!world.services.events.get(hosted).await.unwrap().exists);
    assert!(matches!(
        world.services.registrations.register(host, elsewhere).await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn event_deletion_is_reserved_to_the_host() {
    let world = common::world();
    let host = world.user("host").await;
    let dancer = world.user("dancer").await;
    let event = world.event(host, None, 4).await;
    world.services.registrations.register(dancer, event).await.unwrap();

    assert!(matches!(
        world.services.cascades.delete_event(dancer, event).await,
        Err(CoreError::InvalidOperation(_))
    ));

    let report = world.services.cascades.delete_event(host, event).await.unwrap();
    assert_eq!((report.events, report.registrations), (1, 1));
    assert!(matches!(
        world.services.cascades.delete_event(host, event).await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn registrations_racing_a_club_deletion_never_outlive_it() {
    let world = Arc::new(common::world());
    let leader = world.user("leader").await;
    let club = world.club(leader, "Racers").await;
    let event = world.event(leader, Some(club), 50).await;
    let mut dancers = Vec::new();
    for i in 0..20 {
        dancers.push(world.user(&format!("racer{i}")).await);
    }

    let tasks: Vec<_> = dancers
        .iter()
        .map(|&user| {
            let world = world.clone();
            tokio::spawn(async move { world.services.registrations.register(user, event).await })
        })
        .collect();
    world.services.cascades.delete_club(leader, club).await.unwrap();
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) | Err(CoreError::NotFound(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert!(!world.services.events.get(event).await.unwrap().exists);
    let rows = world.store.registrations_of_event(event).await.unwrap();
    assert!(rows
        .iter()
        .all(|r| r.status != RegistrationStatus::Confirmed));
}
