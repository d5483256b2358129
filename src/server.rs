use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::bot::Relay;
use crate::config::{Config, RelayMode};
use crate::platform::IncomingUpdate;

// ── Shared state ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub webhook_url: String,
}

// ── Handlers ───────────────────────────────────────────────────────────────────

async fn root(State(state): State<AppState>) -> Json<Value> {
    let message = match (state.relay.mode(), state.relay.inference()) {
        (RelayMode::Echo, _) => "Relay is running 🔥 in echo mode".to_string(),
        (RelayMode::Inference, Some(inference)) => format!(
            "Relay is running 🔥 text model: {}, speech model: {}",
            inference.text_model(),
            inference.speech_model()
        ),
        (RelayMode::Inference, None) => {
            "Relay is running 🔥 but inference is not configured".to_string()
        }
    };
    Json(json!({ "message": message, "status": "running" }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "inference_ready": state.relay.inference().is_some(),
        "telegram_ready": state.relay.messenger().is_some(),
    }))
}

/// Telegram push target. Always acknowledges so Telegram does not redeliver.
async fn webhook(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    match serde_json::from_slice::<IncomingUpdate>(&body) {
        Ok(update) => {
            let outcome = state.relay.handle_update(update).await;
            debug!("Webhook handled: {:?}", outcome);
        }
        Err(e) => debug!("Ignoring malformed webhook body: {}", e),
    }
    Json(json!({ "ok": true }))
}

async fn set_webhook(State(state): State<AppState>) -> Json<Value> {
    let Some(messenger) = state.relay.messenger() else {
        return Json(json!({ "ok": false, "message": "TELEGRAM_TOKEN is not set." }));
    };

    match messenger.set_webhook(&state.webhook_url).await {
        Ok(response) => Json(response),
        Err(e) => {
            warn!("setWebhook failed: {}", e);
            Json(json!({
                "ok": false,
                "message": format!("Failed to reach Telegram API: {}", e),
            }))
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .route("/set_webhook", get(set_webhook))
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: &Config, state: AppState) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Relay listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::fakes::{Call, CallLog, FakeInference, FakeMessenger};
    use crate::config::RelayConfig;
    use crate::inference::Inference;
    use crate::platform::telegram::Messenger;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    const WEBHOOK_URL: &str = "https://relay.example/webhook";

    fn app(with_messenger: bool, with_inference: bool) -> (Router, Arc<CallLog>) {
        let log = Arc::new(CallLog::default());
        let messenger: Option<Arc<dyn Messenger>> = with_messenger
            .then(|| Arc::new(FakeMessenger { log: log.clone() }) as Arc<dyn Messenger>);
        let inference: Option<Arc<dyn Inference>> = with_inference.then(|| {
            Arc::new(FakeInference {
                log: log.clone(),
                fail_status: None,
                transcript: "hmm".to_string(),
            }) as Arc<dyn Inference>
        });
        let state = AppState {
            relay: Arc::new(Relay::new(RelayConfig::default(), messenger, inference)),
            webhook_url: WEBHOOK_URL.to_string(),
        };
        (router(state), log)
    }

    async fn call(router: Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_root_reports_models() {
        let (router, _) = app(true, true);
        let (status, json) = call(router, Method::GET, "/", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "running");
        assert!(json["message"].as_str().unwrap().contains("fake/text"));
    }

    #[tokio::test]
    async fn test_health_ok_without_credentials() {
        let (router, _) = app(false, false);
        let (status, json) = call(router, Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["inference_ready"], false);
        assert_eq!(json["telegram_ready"], false);
    }

    #[tokio::test]
    async fn test_health_reports_inference_ready() {
        let (router, _) = app(true, true);
        let (_, json) = call(router, Method::GET, "/health", "").await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["inference_ready"], true);
        assert_eq!(json["telegram_ready"], true);
    }

    #[tokio::test]
    async fn test_webhook_without_message_acks_without_calls() {
        let (router, log) = app(true, true);
        let (status, json) = call(router, Method::POST, "/webhook", r#"{"update_id": 1}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "ok": true }));
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_malformed_body_acks_without_calls() {
        let (router, log) = app(true, true);
        let (status, json) = call(router, Method::POST, "/webhook", "{not json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "ok": true }));
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_text_message_is_relayed() {
        let (router, log) = app(true, true);
        let (_, json) = call(
            router,
            Method::POST,
            "/webhook",
            r#"{"update_id": 2, "message": {"chat": {"id": 42}, "text": "hello"}}"#,
        )
        .await;

        assert_eq!(json, json!({ "ok": true }));
        let calls = log.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], Call::Generate(p) if p.contains("hello")));
        assert!(matches!(&calls[1], Call::SendMessage(42, _)));
    }

    #[tokio::test]
    async fn test_set_webhook_registers_configured_url() {
        let (router, log) = app(true, false);
        let (status, json) = call(router, Method::GET, "/set_webhook", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["description"], "Webhook was set");
        assert_eq!(log.calls(), vec![Call::SetWebhook(WEBHOOK_URL.to_string())]);
    }

    #[tokio::test]
    async fn test_set_webhook_without_token() {
        let (router, log) = app(false, false);
        let (_, json) = call(router, Method::GET, "/set_webhook", "").await;
        assert_eq!(json["ok"], false);
        assert!(json["message"].as_str().unwrap().contains("TELEGRAM_TOKEN"));
        assert!(log.calls().is_empty());
    }
}
