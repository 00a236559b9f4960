//! Walks one organisation's hierarchy through build-up, a rejected cycle, and teardown.

mod common;

use axum::http::StatusCode;
use common::{pairs, sorted, TestApp};
use group_service::models::MembershipAction;
use uuid::Uuid;

#[tokio::test]
async fn engineering_hierarchy_lifecycle() {
    let app = TestApp::new();
    let eng = app.group("engineering").await;
    let platform = app.group("platform").await;
    let backend = app.group("backend").await;
    let user = Uuid::new_v4();
    app.member(user, backend).await;

    // Backend joins Platform.
    let (status, body) = app.insert_edge(platform, backend).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(pairs(&body["added"]), vec![(user, platform)]);

    // Platform joins Engineering.
    let (status, body) = app.insert_edge(eng, platform).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(pairs(&body["added"]), vec![(user, eng)]);

    let mut memberships = app.memberships(user).await;
    memberships.sort();
    assert_eq!(
        memberships,
        {
            let mut expected = vec![
                (backend, true, false),
                (platform, false, false),
                (eng, false, false),
            ];
            expected.sort();
            expected
        }
    );

    // Engineering inside Backend would close the loop.
    let (status, body) = app.insert_edge(backend, eng).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "cycle_detected");

    let (_, members) = app.get(&format!("/groups/{}/members", eng)).await;
    let members = members["members"].as_array().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["user_id"], user.to_string());

    app.emitter.clear();

    // Backend leaves Platform, taking Engineering with it.
    let (status, body) = app.delete_edge(platform, backend).await;
    assert_eq!(status, StatusCode::OK);
    assert!(pairs(&body["added"]).is_empty());
    assert_eq!(
        pairs(&body["removed"]),
        sorted(vec![(user, platform), (user, eng)])
    );

    let mut recorded = app.recorded();
    recorded.sort_by_key(|(_, user_id, group_id)| (*user_id, *group_id));
    let mut expected = vec![
        (MembershipAction::Delete, user, platform),
        (MembershipAction::Delete, user, eng),
    ];
    expected.sort_by_key(|(_, user_id, group_id)| (*user_id, *group_id));
    assert_eq!(recorded, expected);

    assert_eq!(app.memberships(user).await, vec![(backend, true, false)]);

    // Platform is still inside Engineering.
    let (_, ancestors) = app.get(&format!("/groups/{}/ancestors", platform)).await;
    assert_eq!(ancestors["groups"], serde_json::json!([eng]));
}
