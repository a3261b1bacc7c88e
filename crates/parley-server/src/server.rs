use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parley_chat::{SessionDirectory, TurnConfig, TurnRunner};
use parley_identity::{IdentitySync, WebhookVerifier};
use parley_llm::GenerationBackend;
use parley_store::{ConversationRepo, Database, UserRepo};

use crate::auth::SessionKeys;
use crate::config::Config;
use crate::routes;

/// Shared application state passed to Axum handlers. Constructed once at
/// startup and injected — no ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub conversations: Arc<ConversationRepo>,
    pub directory: Arc<SessionDirectory>,
    pub turns: Arc<TurnRunner>,
    pub identity: Arc<IdentitySync>,
    pub webhook_verifier: Arc<WebhookVerifier>,
    pub session_keys: Arc<SessionKeys>,
}

impl AppState {
    pub fn new(db: Database, backend: Arc<dyn GenerationBackend>, config: &Config) -> Self {
        let conversations = Arc::new(ConversationRepo::new(db.clone()));
        let directory = Arc::new(SessionDirectory::new(Arc::clone(&conversations)));
        let turns = Arc::new(TurnRunner::with_config(
            Arc::clone(&conversations),
            backend,
            TurnConfig {
                min_prompt_chars: config.min_prompt_chars,
            },
        ));
        let identity = Arc::new(IdentitySync::new(UserRepo::new(db.clone())));
        let webhook_verifier = Arc::new(WebhookVerifier::new(
            &config.webhook_secret,
            config.webhook_tolerance,
        ));
        let session_keys = Arc::new(SessionKeys::new(&config.session_secret));

        Self {
            db,
            conversations,
            directory,
            turns,
            identity,
            webhook_verifier,
            session_keys,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/chats", post(routes::create_chat).get(routes::list_chats))
        .route(
            "/chats/{id}",
            patch(routes::rename_chat).delete(routes::delete_chat),
        )
        .route("/chats/{id}/messages", post(routes::send_message))
        .route("/session", get(routes::open_session))
        .route("/identity-events", post(routes::identity_events))
        .route("/health", get(routes::health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Create and start the server. Returns a handle that keeps it alive.
pub async fn start(addr: SocketAddr, state: AppState) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "parley server started");

    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server,
    })
}

/// Handle returned by `start()` — dropping it does not stop the server
/// task, but holding it keeps the port readable for callers.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use parley_core::errors::GenerationError;
    use parley_llm::MockBackend;

    async fn start_test_server(
        backend: Arc<dyn GenerationBackend>,
    ) -> (ServerHandle, AppState, String) {
        let config = Config {
            http_addr: ([127, 0, 0, 1], 0).into(),
            ..Config::default()
        };
        let db = Database::in_memory().unwrap();
        let state = AppState::new(db, backend, &config);
        let handle = start(config.http_addr, state.clone()).await.unwrap();
        let base = format!("http://127.0.0.1:{}", handle.port);
        (handle, state, base)
    }

    fn token(state: &AppState, sub: &str) -> String {
        state.session_keys.issue(sub, Duration::from_secs(3600))
    }

    async fn create_chat(base: &str, token: &str, name: &str) -> serde_json::Value {
        let resp = reqwest::Client::new()
            .post(format!("{base}/chats"))
            .bearer_auth(token)
            .json(&serde_json::json!({"name": name}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        resp.json().await.unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_reports_healthy() {
        let (_handle, _state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["components"]["database"], "ok");
    }

    #[tokio::test]
    async fn create_then_list_roundtrip() {
        let (_handle, state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let token = token(&state, "sub_a");

        let created = create_chat(&base, &token, "Test").await;
        assert_eq!(created["name"], "Test");
        assert_eq!(created["messages"], serde_json::json!([]));
        assert!(created["createdAt"].is_string());
        assert!(created["updatedAt"].is_string());

        let resp = reqwest::Client::new()
            .get(format!("{base}/chats"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let chats: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(chats.as_array().unwrap().len(), 1);
        assert_eq!(chats[0]["id"], created["id"]);
    }

    #[tokio::test]
    async fn create_without_name_uses_default() {
        let (_handle, state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let token = token(&state, "sub_a");

        let resp = reqwest::Client::new()
            .post(format!("{base}/chats"))
            .bearer_auth(&token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["name"], "New Chat");
    }

    #[tokio::test]
    async fn missing_token_is_unauthenticated() {
        let (_handle, _state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let resp = reqwest::Client::new()
            .get(format!("{base}/chats"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["kind"], "unauthenticated");
    }

    #[tokio::test]
    async fn forged_token_is_unauthenticated() {
        let (_handle, _state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let forged = SessionKeys::new(&secrecy::SecretString::from("wrong-secret"))
            .issue("sub_a", Duration::from_secs(3600));
        let resp = reqwest::Client::new()
            .get(format!("{base}/chats"))
            .bearer_auth(forged)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn rename_roundtrip() {
        let (_handle, state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let token = token(&state, "sub_a");
        let created = create_chat(&base, &token, "Old Name").await;
        let id = created["id"].as_str().unwrap();

        let resp = reqwest::Client::new()
            .patch(format!("{base}/chats/{id}"))
            .bearer_auth(&token)
            .json(&serde_json::json!({"name": "New Name"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["name"], "New Name");
    }

    #[tokio::test]
    async fn rename_to_whitespace_is_rejected_and_name_kept() {
        let (_handle, state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let token = token(&state, "sub_a");
        let created = create_chat(&base, &token, "Keep Me").await;
        let id = created["id"].as_str().unwrap();

        let resp = reqwest::Client::new()
            .patch(format!("{base}/chats/{id}"))
            .bearer_auth(&token)
            .json(&serde_json::json!({"name": "   "}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["kind"], "invalid_input");

        let chats: serde_json::Value = reqwest::Client::new()
            .get(format!("{base}/chats"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(chats[0]["name"], "Keep Me");
    }

    #[tokio::test]
    async fn malformed_id_is_invalid_identifier() {
        let (_handle, state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let token = token(&state, "sub_a");

        let resp = reqwest::Client::new()
            .delete(format!("{base}/chats/not-an-id"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["kind"], "invalid_identifier");
    }

    #[tokio::test]
    async fn delete_twice_second_is_not_found() {
        let (_handle, state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let token = token(&state, "sub_a");
        let created = create_chat(&base, &token, "Doomed").await;
        let id = created["id"].as_str().unwrap();
        let client = reqwest::Client::new();

        let resp = client
            .delete(format!("{base}/chats/{id}"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["deleted"], true);

        let resp = client
            .delete(format!("{base}/chats/{id}"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn non_owner_sees_not_found_never_data() {
        let (_handle, state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let owner = token(&state, "sub_a");
        let stranger = token(&state, "sub_b");
        let created = create_chat(&base, &owner, "Private").await;
        let id = created["id"].as_str().unwrap();
        let client = reqwest::Client::new();

        let rename = client
            .patch(format!("{base}/chats/{id}"))
            .bearer_auth(&stranger)
            .json(&serde_json::json!({"name": "Hijacked"}))
            .send()
            .await
            .unwrap();
        assert_eq!(rename.status(), 404);

        let delete = client
            .delete(format!("{base}/chats/{id}"))
            .bearer_auth(&stranger)
            .send()
            .await
            .unwrap();
        assert_eq!(delete.status(), 404);

        let message = client
            .post(format!("{base}/chats/{id}/messages"))
            .bearer_auth(&stranger)
            .json(&serde_json::json!({"prompt": "let me in"}))
            .send()
            .await
            .unwrap();
        assert_eq!(message.status(), 404);
    }

    #[tokio::test]
    async fn send_message_appends_turn_and_returns_assistant() {
        let (_handle, state, base) =
            start_test_server(Arc::new(MockBackend::replying("Hi! How can I help?"))).await;
        let token = token(&state, "sub_a");
        let created = create_chat(&base, &token, "Test").await;
        let id = created["id"].as_str().unwrap();
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/chats/{id}/messages"))
            .bearer_auth(&token)
            .json(&serde_json::json!({"prompt": "Hello there"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let reply: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(reply["role"], "assistant");
        assert_eq!(reply["content"], "Hi! How can I help?");
        assert!(reply["timestamp"].is_string());

        let chats: serde_json::Value = client
            .get(format!("{base}/chats"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let messages = chats[0]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "Hello there");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"], "Hi! How can I help?");
    }

    #[tokio::test]
    async fn generation_failure_returns_bad_gateway_and_persists_nothing() {
        let backend = Arc::new(MockBackend::failing(GenerationError::Upstream {
            status: 500,
            body: "backend down".into(),
        }));
        let (_handle, state, base) = start_test_server(backend).await;
        let token = token(&state, "sub_a");
        let created = create_chat(&base, &token, "Test").await;
        let id = created["id"].as_str().unwrap();
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/chats/{id}/messages"))
            .bearer_auth(&token)
            .json(&serde_json::json!({"prompt": "Hello there"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 502);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["kind"], "generation_failed");

        let chats: serde_json::Value = client
            .get(format!("{base}/chats"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(chats[0]["messages"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn short_prompt_is_rejected_by_quality_gate() {
        let (_handle, state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let token = token(&state, "sub_a");
        let created = create_chat(&base, &token, "Test").await;
        let id = created["id"].as_str().unwrap();

        let resp = reqwest::Client::new()
            .post(format!("{base}/chats/{id}/messages"))
            .bearer_auth(&token)
            .json(&serde_json::json!({"prompt": "hey"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["kind"], "invalid_input");
    }

    #[tokio::test]
    async fn session_bootstraps_first_conversation_once() {
        let (_handle, state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let token = token(&state, "sub_a");
        let client = reqwest::Client::new();

        let view: serde_json::Value = client
            .get(format!("{base}/session"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let conversations = view["conversations"].as_array().unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0]["name"], "New Chat");
        assert_eq!(view["selected"], conversations[0]["id"]);

        let again: serde_json::Value = client
            .get(format!("{base}/session"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(again["conversations"].as_array().unwrap().len(), 1);
    }

    // -- Webhook ingress --

    fn signed_headers(state: &AppState, body: &str) -> (String, String, String) {
        let id = "msg_1".to_string();
        let ts = Utc::now().timestamp().to_string();
        let sig = state.webhook_verifier.signature_header(&id, &ts, body.as_bytes());
        (id, ts, sig)
    }

    async fn post_event(base: &str, id: &str, ts: &str, sig: &str, body: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{base}/identity-events"))
            .header("webhook-id", id)
            .header("webhook-timestamp", ts)
            .header("webhook-signature", sig)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn verified_created_event_creates_user_idempotently() {
        let (_handle, state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let body = serde_json::json!({
            "type": "user.created",
            "data": {"id": "sub_a", "email": "ada@example.com", "first_name": "Ada"}
        })
        .to_string();
        let (id, ts, sig) = signed_headers(&state, &body);

        let resp = post_event(&base, &id, &ts, &sig, &body).await;
        assert_eq!(resp.status(), 200);
        let out: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(out["processed"], true);

        // At-least-once delivery: the replay also succeeds.
        let resp = post_event(&base, &id, &ts, &sig, &body).await;
        assert_eq!(resp.status(), 200);

        let users = UserRepo::new(state.db.clone());
        assert_eq!(users.count().unwrap(), 1);
        assert_eq!(users.get_by_email("ada@example.com").unwrap().name, "Ada");
    }

    #[tokio::test]
    async fn tampered_webhook_is_rejected_without_side_effects() {
        let (_handle, state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let body = serde_json::json!({
            "type": "user.created",
            "data": {"email": "mallory@example.com"}
        })
        .to_string();
        let (id, ts, _) = signed_headers(&state, &body);

        let resp = post_event(&base, &id, &ts, "v1,Zm9yZ2Vk", &body).await;
        assert_eq!(resp.status(), 400);
        let out: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(out["error"]["kind"], "authenticity_error");

        let users = UserRepo::new(state.db.clone());
        assert_eq!(users.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn webhook_without_headers_is_rejected() {
        let (_handle, _state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/identity-events"))
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn verified_event_without_email_is_invalid_input() {
        let (_handle, state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let body = serde_json::json!({
            "type": "user.created",
            "data": {"first_name": "Nameless"}
        })
        .to_string();
        let (id, ts, sig) = signed_headers(&state, &body);

        let resp = post_event(&base, &id, &ts, &sig, &body).await;
        assert_eq!(resp.status(), 400);
        let out: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(out["error"]["kind"], "invalid_input");
    }

    #[tokio::test]
    async fn verified_deleted_event_removes_user() {
        let (_handle, state, base) = start_test_server(Arc::new(MockBackend::replying("ok"))).await;
        let users = UserRepo::new(state.db.clone());
        users
            .upsert_by_email("ada@example.com", "Ada", "", Some("sub_a"))
            .unwrap();

        let body = serde_json::json!({
            "type": "user.deleted",
            "data": {"email": "ada@example.com"}
        })
        .to_string();
        let (id, ts, sig) = signed_headers(&state, &body);

        let resp = post_event(&base, &id, &ts, &sig, &body).await;
        assert_eq!(resp.status(), 200);
        assert!(users.get_by_email("ada@example.com").is_err());
    }
}
