//! Router-level tests: authentication, task CRUD, sharing, analytics and
//! live notification fan-out, driven through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::sync::Arc;
use taskhub::api::{AppState, build_router};
use taskhub::config::Config;
use taskhub::db::Database;
use taskhub::realtime::ServerMessage;
use taskhub::types::{UpsertUser, User};
use tower::ServiceExt;

const SECRET: &str = "test-session-secret";

struct TestApp {
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().expect("Failed to create in-memory database"));
        let state = AppState::new(db, Arc::new(Config::default()), SECRET);
        Self { state }
    }

    fn user(&self, id: &str, email: &str) -> (User, String) {
        let user = self
            .state
            .db
            .upsert_user(&UpsertUser {
                id: id.to_string(),
                email: email.to_string(),
                display_name: None,
                avatar_url: None,
            })
            .unwrap();
        let token = self.state.issue_token(&user).unwrap();
        (user, token)
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = build_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn create(&self, token: &str, body: Value) -> i64 {
        let (status, task) = self.send("POST", "/api/tasks", Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {task}");
        task["id"].as_i64().unwrap()
    }
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn health_needs_no_session() {
        let app = TestApp::new();
        let (status, body) = app.send("GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_or_bad_tokens() {
        let app = TestApp::new();

        let (status, body) = app.send("GET", "/api/tasks", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHENTICATED");

        let (status, _) = app.send("GET", "/api/auth/user", Some("not-a-token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn current_user_comes_from_session() {
        let app = TestApp::new();
        let (_, token) = app.user("g-1", "alice@example.com");

        let (status, body) = app.send("GET", "/api/auth/user", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "g-1");
        assert_eq!(body["displayName"], "alice");
    }

    #[tokio::test]
    async fn login_without_provider_is_external_failure() {
        let app = TestApp::new();
        let (status, body) = app.send("GET", "/api/auth/google", None, None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "EXTERNAL_DEPENDENCY");
    }

    #[tokio::test]
    async fn callback_without_state_redirects_with_error() {
        let app = TestApp::new();
        let response = build_router(app.state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/auth/google/callback?code=abc&state=xyz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_redirection());
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/?error=auth_failed"
        );
    }
}

mod task_tests {
    use super::*;

    #[tokio::test]
    async fn create_get_update_delete() {
        let app = TestApp::new();
        let (_, token) = app.user("a", "a@example.com");

        let id = app
            .create(
                &token,
                json!({"title": "Write report", "priority": "high", "ownerId": "mallory"}),
            )
            .await;

        let (status, task) = app.send("GET", &format!("/api/tasks/{id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["ownerId"], "a");
        assert_eq!(task["owner"]["id"], "a");
        assert_eq!(task["status"], "pending");
        assert_eq!(task["shares"], json!([]));

        let (status, task) = app
            .send(
                "PATCH",
                &format!("/api/tasks/{id}"),
                Some(&token),
                Some(json!({"status": "in-progress"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["status"], "in-progress");
        assert_eq!(task["priority"], "high");

        let (status, activities) = app
            .send("GET", &format!("/api/tasks/{id}/activities"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(activities[0]["action"], "updated");
        assert_eq!(activities[0]["details"]["status"], "in-progress");
        assert_eq!(activities[1]["action"], "created");

        let (status, _) = app.send("DELETE", &format!("/api/tasks/{id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.send("GET", &format!("/api/tasks/{id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn validation_errors_are_itemized() {
        let app = TestApp::new();
        let (_, token) = app.user("a", "a@example.com");

        let (status, body) = app
            .send(
                "POST",
                "/api/tasks",
                Some(&token),
                Some(json!({"title": "  ", "status": "done"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");
        let fields: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["title", "status"]);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let app = TestApp::new();
        let (_, token) = app.user("a", "a@example.com");

        let response = build_router(app.state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tasks")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn hidden_task_looks_missing() {
        let app = TestApp::new();
        let (_, alice) = app.user("a", "a@example.com");
        let (_, carol) = app.user("c", "c@example.com");
        let id = app.create(&alice, json!({"title": "Private"})).await;

        let (hidden, _) = app.send("GET", &format!("/api/tasks/{id}"), Some(&carol), None).await;
        let (missing, _) = app.send("GET", "/api/tasks/9999", Some(&carol), None).await;
        assert_eq!(hidden, StatusCode::NOT_FOUND);
        assert_eq!(missing, StatusCode::NOT_FOUND);

        let (status, _) = app
            .send(
                "PATCH",
                &format!("/api/tasks/{id}"),
                Some(&carol),
                Some(json!({"title": "mine now"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.send("GET", "/api/tasks/abc", Some(&carol), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_applies_filters_and_reports_total() {
        let app = TestApp::new();
        let (_, token) = app.user("a", "a@example.com");
        for (title, priority) in [("one", "high"), ("two", "low"), ("three", "high")] {
            app.create(&token, json!({"title": title, "priority": priority}))
                .await;
        }

        let (status, page) = app
            .send(
                "GET",
                "/api/tasks?priority=high&sortBy=title&sortOrder=asc&limit=1",
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 2);
        assert_eq!(page["tasks"].as_array().unwrap().len(), 1);
        assert_eq!(page["tasks"][0]["title"], "one");

        let (status, page) = app
            .send("GET", "/api/tasks?status=all&priority=all", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 3);

        let (status, body) = app
            .send("GET", "/api/tasks?sortBy=owner", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["field"], "sortBy");
    }
}

mod share_tests {
    use super::*;

    #[tokio::test]
    async fn view_share_reads_but_cannot_write() {
        let app = TestApp::new();
        let (_, alice) = app.user("a", "a@example.com");
        let (_, bob) = app.user("b", "b@example.com");
        let id = app.create(&alice, json!({"title": "Write spec"})).await;

        let (status, share) = app
            .send(
                "POST",
                &format!("/api/tasks/{id}/share"),
                Some(&alice),
                Some(json!({"email": "b@example.com", "permission": "view"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(share["userId"], "b");
        assert_eq!(share["permission"], "view");

        let (status, page) = app.send("GET", "/api/tasks", Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 1);

        let (status, _) = app
            .send(
                "PATCH",
                &format!("/api/tasks/{id}"),
                Some(&bob),
                Some(json!({"status": "completed"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.send("DELETE", &format!("/api/tasks/{id}"), Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, shares) = app
            .send("GET", &format!("/api/tasks/{id}/shares"), Some(&bob), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(shares[0]["user"]["email"], "b@example.com");
    }

    #[tokio::test]
    async fn resharing_returns_ok_and_keeps_one_row() {
        let app = TestApp::new();
        let (_, alice) = app.user("a", "a@example.com");
        app.user("b", "b@example.com");
        let id = app.create(&alice, json!({"title": "Shared"})).await;
        let uri = format!("/api/tasks/{id}/share");

        app.send(
            "POST",
            &uri,
            Some(&alice),
            Some(json!({"email": "b@example.com", "permission": "view"})),
        )
        .await;
        let (status, share) = app
            .send(
                "POST",
                &uri,
                Some(&alice),
                Some(json!({"email": "b@example.com", "permission": "edit"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(share["permission"], "edit");

        let (_, shares) = app
            .send("GET", &format!("/api/tasks/{id}/shares"), Some(&alice), None)
            .await;
        assert_eq!(shares.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn share_error_statuses() {
        let app = TestApp::new();
        let (_, alice) = app.user("a", "a@example.com");
        let (_, bob) = app.user("b", "b@example.com");
        app.user("c", "c@example.com");
        let id = app.create(&alice, json!({"title": "Shared"})).await;
        let uri = format!("/api/tasks/{id}/share");

        let (status, body) = app
            .send(
                "POST",
                &uri,
                Some(&alice),
                Some(json!({"email": "ghost@example.com", "permission": "view"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "RECIPIENT_NOT_FOUND");

        let (status, body) = app
            .send(
                "POST",
                &uri,
                Some(&alice),
                Some(json!({"email": "a@example.com", "permission": "view"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_SHARE_TARGET");

        let (status, _) = app
            .send(
                "POST",
                &uri,
                Some(&alice),
                Some(json!({"email": "b@example.com", "permission": "admin"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        app.send(
            "POST",
            &uri,
            Some(&alice),
            Some(json!({"email": "b@example.com", "permission": "edit"})),
        )
        .await;
        let (status, body) = app
            .send(
                "POST",
                &uri,
                Some(&bob),
                Some(json!({"email": "c@example.com", "permission": "view"})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn owner_removes_share() {
        let app = TestApp::new();
        let (_, alice) = app.user("a", "a@example.com");
        let (_, bob) = app.user("b", "b@example.com");
        let id = app.create(&alice, json!({"title": "Shared"})).await;
        app.send(
            "POST",
            &format!("/api/tasks/{id}/share"),
            Some(&alice),
            Some(json!({"email": "b@example.com", "permission": "edit"})),
        )
        .await;

        let uri = format!("/api/tasks/{id}/shares/b");
        let (status, _) = app.send("DELETE", &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.send("DELETE", &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = app.send("DELETE", &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "SHARE_NOT_FOUND");

        let (status, _) = app.send("GET", &format!("/api/tasks/{id}"), Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

mod analytics_tests {
    use super::*;

    #[tokio::test]
    async fn stats_follow_completion() {
        let app = TestApp::new();
        let (_, token) = app.user("a", "a@example.com");
        let yesterday = (chrono::Utc::now() - chrono::Duration::days(1)).to_rfc3339();
        let id = app
            .create(
                &token,
                json!({"title": "Write spec", "priority": "high", "dueDate": yesterday}),
            )
            .await;

        let (status, stats) = app.send("GET", "/api/analytics/stats", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["overdue"], 1);
        assert_eq!(stats["highPriority"], 1);

        app.send(
            "PATCH",
            &format!("/api/tasks/{id}"),
            Some(&token),
            Some(json!({"status": "completed"})),
        )
        .await;
        let (_, stats) = app.send("GET", "/api/analytics/stats", Some(&token), None).await;
        assert_eq!(stats["overdue"], 0);
        assert_eq!(stats["completed"], 1);
    }

    #[tokio::test]
    async fn productivity_and_team() {
        let app = TestApp::new();
        let (_, token) = app.user("a", "a@example.com");
        for title in ["one", "two", "three"] {
            app.create(&token, json!({"title": title})).await;
        }

        let (status, series) = app
            .send("GET", "/api/analytics/productivity?days=7", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let points = series.as_array().unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0]["created"], 3);
        assert_eq!(points[0]["completed"], 0);

        let (status, _) = app
            .send("GET", "/api/analytics/productivity?days=soon", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, team) = app.send("GET", "/api/analytics/team", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(team[0]["user"]["id"], "a");
        assert_eq!(team[0]["totalTasks"], 3);
    }
}

mod notification_tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_task_audience_only() {
        let app = TestApp::new();
        let (_, alice) = app.user("a", "a@example.com");
        app.user("b", "b@example.com");
        app.user("c", "c@example.com");

        let (_, mut alice_rx) = app.state.hub.register("a");
        let (_, mut bob_rx) = app.state.hub.register("b");
        let (_, mut carol_rx) = app.state.hub.register("c");

        let id = app.create(&alice, json!({"title": "Team task"})).await;
        assert!(matches!(
            alice_rx.try_recv(),
            Ok(ServerMessage::TaskCreated { task_id, .. }) if task_id == id
        ));
        assert!(bob_rx.try_recv().is_err());

        app.send(
            "POST",
            &format!("/api/tasks/{id}/share"),
            Some(&alice),
            Some(json!({"email": "b@example.com", "permission": "view"})),
        )
        .await;
        assert!(matches!(alice_rx.try_recv(), Ok(ServerMessage::TaskShared { .. })));
        assert!(matches!(bob_rx.try_recv(), Ok(ServerMessage::TaskShared { .. })));

        app.send(
            "PATCH",
            &format!("/api/tasks/{id}"),
            Some(&alice),
            Some(json!({"priority": "low"})),
        )
        .await;
        match bob_rx.try_recv() {
            Ok(ServerMessage::TaskUpdated { changes, user, .. }) => {
                assert_eq!(changes, json!({"priority": "low"}));
                assert_eq!(user.id, "a");
            }
            other => panic!("unexpected message: {other:?}"),
        }

        app.send("DELETE", &format!("/api/tasks/{id}"), Some(&alice), None)
            .await;
        assert!(matches!(bob_rx.try_recv(), Ok(ServerMessage::TaskDeleted { .. })));

        assert!(carol_rx.try_recv().is_err());
    }
}
