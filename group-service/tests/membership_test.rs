mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::TestApp;
use uuid::Uuid;

#[tokio::test]
async fn health_reports_group_store_up() {
    let app = TestApp::new();

    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["group_store"], "up");
}

#[tokio::test]
async fn health_is_unavailable_when_store_is_down() {
    let app = TestApp::new();
    app.store.set_unavailable(true);

    let (status, _) = app.get("/health").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn user_without_memberships_gets_empty_list() {
    let app = TestApp::new();
    let user = Uuid::new_v4();

    let (status, body) = app.get(&format!("/users/{}/memberships", user)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user.to_string());
    assert!(body["memberships"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn memberships_follow_the_chain_upwards() {
    let app = TestApp::new();
    let a = app.group("a").await;
    let b = app.group("b").await;
    let c = app.group("c").await;
    let user = Uuid::new_v4();
    app.member(user, a).await;
    // a is a member of b, b is a member of c
    app.seed_edge(b, a, None).await;
    app.seed_edge(c, b, None).await;

    let mut memberships = app.memberships(user).await;
    memberships.sort();

    let mut expected = vec![(a, true, false), (b, false, false), (c, false, false)];
    expected.sort();
    assert_eq!(memberships, expected);
}

#[tokio::test]
async fn expired_edges_contribute_nothing() {
    let app = TestApp::new();
    let a = app.group("a").await;
    let b = app.group("b").await;
    let user = Uuid::new_v4();
    app.member(user, a).await;
    app.seed_edge(b, a, Some(Utc::now() - Duration::minutes(5)))
        .await;

    let memberships = app.memberships(user).await;

    assert_eq!(memberships, vec![(a, true, false)]);
}

#[tokio::test]
async fn admin_flag_stays_on_the_direct_group() {
    let app = TestApp::new();
    let a = app.group("a").await;
    let b = app.group("b").await;
    let user = Uuid::new_v4();
    app.admin(user, a, None).await;
    app.seed_edge(b, a, None).await;

    let memberships = app.memberships(user).await;

    assert!(memberships.contains(&(a, true, true)));
    assert!(memberships.contains(&(b, false, false)));
}

#[tokio::test]
async fn lapsed_admin_privilege_keeps_membership() {
    let app = TestApp::new();
    let a = app.group("a").await;
    let user = Uuid::new_v4();
    app.admin(user, a, Some(Utc::now() - Duration::hours(1)))
        .await;

    let memberships = app.memberships(user).await;

    assert_eq!(memberships, vec![(a, true, false)]);
}

#[tokio::test]
async fn direct_membership_wins_over_inherited() {
    let app = TestApp::new();
    let a = app.group("a").await;
    let b = app.group("b").await;
    let user = Uuid::new_v4();
    app.member(user, a).await;
    app.admin(user, b, None).await;
    app.seed_edge(b, a, None).await;

    let memberships = app.memberships(user).await;

    assert_eq!(memberships.len(), 2);
    assert!(memberships.contains(&(b, true, true)));
}

#[tokio::test]
async fn soft_deleted_groups_are_invisible() {
    let app = TestApp::new();
    let a = app.group("a").await;
    let b = app.group("b").await;
    let user = Uuid::new_v4();
    app.member(user, a).await;
    app.seed_edge(b, a, None).await;
    app.store.soft_delete_group(b, Utc::now()).await;

    let memberships = app.memberships(user).await;
    assert_eq!(memberships, vec![(a, true, false)]);

    let (status, _) = app.get(&format!("/groups/{}/members", b)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn group_members_include_inherited_users() {
    let app = TestApp::new();
    let a = app.group("a").await;
    let b = app.group("b").await;
    let direct_user = Uuid::new_v4();
    let inherited_user = Uuid::new_v4();
    app.admin(direct_user, b, None).await;
    app.member(inherited_user, a).await;
    app.seed_edge(b, a, None).await;

    let (status, body) = app.get(&format!("/groups/{}/members", b)).await;

    assert_eq!(status, StatusCode::OK);
    let members = body["members"].as_array().unwrap();
    assert_eq!(members.len(), 2);
    let inherited = members
        .iter()
        .find(|m| m["user_id"] == inherited_user.to_string())
        .unwrap();
    assert_eq!(inherited["direct"], false);
    assert_eq!(inherited["is_admin"], false);
    let direct = members
        .iter()
        .find(|m| m["user_id"] == direct_user.to_string())
        .unwrap();
    assert_eq!(direct["direct"], true);
    assert_eq!(direct["is_admin"], true);
}

#[tokio::test]
async fn ancestors_and_descendants_render_the_hierarchy() {
    let app = TestApp::new();
    let a = app.group("a").await;
    let b = app.group("b").await;
    let c = app.group("c").await;
    app.seed_edge(b, a, None).await;
    app.seed_edge(c, b, None).await;

    let (status, body) = app.get(&format!("/groups/{}/ancestors", a)).await;
    assert_eq!(status, StatusCode::OK);
    let mut ancestors: Vec<String> = serde_json::from_value(body["groups"].clone()).unwrap();
    ancestors.sort();
    let mut expected = vec![b.to_string(), c.to_string()];
    expected.sort();
    assert_eq!(ancestors, expected);

    let (status, body) = app.get(&format!("/groups/{}/descendants", c)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["groups"].as_array().unwrap().len(), 2);

    let (status, _) = app
        .get(&format!("/groups/{}/ancestors", Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cycle_check_reports_the_closing_path() {
    let app = TestApp::new();
    let a = app.group("a").await;
    let b = app.group("b").await;
    let c = app.group("c").await;
    app.seed_edge(b, a, None).await;
    app.seed_edge(c, b, None).await;

    // Making c a member of a would close a -> b -> c -> a.
    let (status, body) = app
        .get(&format!(
            "/hierarchy/cycle-check?parent_group_id={}&member_group_id={}",
            a, c
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["would_create_cycle"], true);
    assert!(!body["path"].as_array().unwrap().is_empty());

    let (status, body) = app
        .get(&format!(
            "/hierarchy/cycle-check?parent_group_id={}&member_group_id={}",
            c, a
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["would_create_cycle"], false);
}

#[tokio::test]
async fn cycle_check_flags_self_reference() {
    let app = TestApp::new();
    let a = app.group("a").await;

    let (status, body) = app
        .get(&format!(
            "/hierarchy/cycle-check?parent_group_id={}&member_group_id={}",
            a, a
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["would_create_cycle"], true);
}

#[tokio::test]
async fn malformed_user_id_is_rejected() {
    let app = TestApp::new();

    let (status, _) = app.get("/users/not-a-uuid/memberships").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reads_fail_when_store_is_down() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    app.store.set_unavailable(true);

    let (status, _) = app.get(&format!("/users/{}/memberships", user)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn bulk_enumeration_matches_per_user() {
    let app = TestApp::new();
    let a = app.group("a").await;
    let b = app.group("b").await;
    let c = app.group("c").await;
    let u1 = Uuid::new_v4();
    let u2 = Uuid::new_v4();
    app.member(u1, a).await;
    app.admin(u2, b, None).await;
    app.seed_edge(b, a, None).await;
    app.seed_edge(c, b, None).await;

    let snapshot = app.state.membership.enumerate_all().await.unwrap();

    for user in [u1, u2] {
        let per_user = app.state.membership.enumerate_memberships(user).await.unwrap();
        assert_eq!(snapshot.memberships_for(user), per_user);
    }
}
