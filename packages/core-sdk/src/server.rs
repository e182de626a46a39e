use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, get_service, post};
use axum::{Json, Router};
use futures_util::future::join_all;
use serde::Deserialize;
use time::OffsetDateTime;
use tower_http::services::ServeDir;

use crate::config::ProviderConfig;
use crate::llm;
use crate::models::{ChatQuery, ChatResponse};
use crate::orchestrator::Orchestrator;
use crate::telemetry;

/** \brief 健康检查单个 Provider 的探测上限。 */
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/**
 * \brief 启动 HTTP 服务，提供静态聊天页与 API。
 * \param addr 监听地址，如 "127.0.0.1:5173"
 */
pub async fn run(addr: &str) -> Result<()> {
    telemetry::init_from_env();
    let orchestrator = Arc::new(Orchestrator::from_env());
    let app = router(orchestrator);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/**
 * \brief 组装路由。静态页目录可用 SAGEGREEN_UI_DIR 覆盖，默认 "web"。
 */
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let ui_root = std::env::var("SAGEGREEN_UI_DIR").unwrap_or_else(|_| "web".to_string());
    let static_handler = ServeDir::new(ui_root).append_index_html_on_directories(true);
    let static_service = get_service(static_handler);

    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/config", get(get_config))
        .fallback_service(static_service)
        .with_state(orchestrator)
}

#[derive(Deserialize, Debug)]
struct ChatRequest {
    /** \brief 用户查询文本 */
    query: String,
    /** \brief 会话标识（可选，缺省时生成） */
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
    /** \brief 固定使用指定 Provider（可选） */
    #[serde(default, alias = "forceProvider")]
    force_provider: Option<String>,
    /** \brief 模型提示（可选） */
    #[serde(default, alias = "modelHint")]
    model_hint: Option<String>,
}

/**
 * \brief 聊天入口：任何已解析的结局（含兜底）都是 200。
 */
async fn chat(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    if payload.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must not be empty".to_string()));
    }

    let mut query = ChatQuery::new(
        payload.query,
        payload.session_id.unwrap_or_else(new_session_id),
    );
    query.force_provider = payload.force_provider;
    query.model_hint = payload.model_hint;

    telemetry::log_event(
        "server.chat",
        &format!("session={} query_len={}", query.session_id, query.text.len()),
    );

    let response = orchestrator.answer(&query).await;
    Ok(Json(response))
}

/**
 * \brief 健康检查：并发探测每个已配置 Provider，结果汇总为一份 JSON。
 */
async fn health(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> Json<serde_json::Value> {
    let probes = orchestrator
        .chain()
        .iter()
        .map(|provider| probe_provider(orchestrator.http_client(), provider));
    let providers: Vec<serde_json::Value> = join_all(probes).await;

    Json(serde_json::json!({
        "timestamp": now_rfc3339(),
        "configured": orchestrator.chain().len(),
        "providers": providers,
    }))
}

async fn probe_provider(
    client: &reqwest::Client,
    provider: &ProviderConfig,
) -> serde_json::Value {
    let query = ChatQuery::new("Hello", new_session_id());
    let outcome = tokio::time::timeout(PROBE_TIMEOUT, llm::invoke(client, provider, &query)).await;
    match outcome {
        Ok(Ok(_)) => serde_json::json!({
            "name": provider.name,
            "kind": provider.kind.label(),
            "status": "healthy",
        }),
        Ok(Err(e)) => serde_json::json!({
            "name": provider.name,
            "kind": provider.kind.label(),
            "status": "error",
            "error": e.to_string(),
        }),
        Err(_) => serde_json::json!({
            "name": provider.name,
            "kind": provider.kind.label(),
            "status": "timeout",
        }),
    }
}

/**
 * \brief 服务自述。
 */
async fn status(State(orchestrator): State<Arc<Orchestrator>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "SageGreen Intelligence Assistant",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "operational",
        "providers_configured": orchestrator.chain().len(),
        "features": {
            "chat": true,
            "provider_fallback": true,
            "canned_responses": true,
        }
    }))
}

/**
 * \brief 当前调用链（凭据脱敏）。
 */
async fn get_config(State(orchestrator): State<Arc<Orchestrator>>) -> Json<serde_json::Value> {
    let providers: Vec<serde_json::Value> = orchestrator
        .chain()
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "kind": p.kind.label(),
                "endpoint": p.redacted_endpoint(),
                "model": p.model_label(),
            })
        })
        .collect();
    Json(serde_json::json!({ "providers": providers }))
}

fn new_session_id() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    format!("session-{}", millis)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canned;
    use crate::config::Settings;
    use crate::orchestrator::FINAL_FALLBACK_SOURCE;

    async fn serve_ephemeral(orchestrator: Orchestrator) -> String {
        let app = router(Arc::new(orchestrator));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{}", addr)
    }

    fn empty_orchestrator() -> Orchestrator {
        Orchestrator::new(Vec::new(), Settings::default())
    }

    #[tokio::test]
    async fn test_chat_resolves_with_final_fallback() {
        let base = serve_ephemeral(empty_orchestrator()).await;
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/api/chat", base))
            .json(&serde_json::json!({ "query": "financial summary" }))
            .send()
            .await
            .expect("post chat");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let body: serde_json::Value = resp.json().await.expect("parse body");
        assert_eq!(body["source"], FINAL_FALLBACK_SOURCE);
        assert_eq!(body["response"], canned::financial_summary());
        assert!(body["session_id"]
            .as_str()
            .expect("session id")
            .starts_with("session-"));
    }

    #[tokio::test]
    async fn test_chat_echoes_given_session_id() {
        let base = serve_ephemeral(empty_orchestrator()).await;
        let client = reqwest::Client::new();
        let body: serde_json::Value = client
            .post(format!("{}/api/chat", base))
            .json(&serde_json::json!({ "query": "hello there", "sessionId": "s-42" }))
            .send()
            .await
            .expect("post chat")
            .json()
            .await
            .expect("parse body");
        assert_eq!(body["session_id"], "s-42");
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_query() {
        let base = serve_ephemeral(empty_orchestrator()).await;
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/api/chat", base))
            .json(&serde_json::json!({ "query": "   " }))
            .send()
            .await
            .expect("post chat");
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_malformed_body_is_400() {
        let base = serve_ephemeral(empty_orchestrator()).await;
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/api/chat", base))
            .header("content-type", "application/json")
            .body("{ not json")
            .send()
            .await
            .expect("post chat");
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_wrong_method_is_405() {
        let base = serve_ephemeral(empty_orchestrator()).await;
        let resp = reqwest::get(format!("{}/api/chat", base))
            .await
            .expect("get chat");
        assert_eq!(resp.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_status_reports_operational() {
        let base = serve_ephemeral(empty_orchestrator()).await;
        let body: serde_json::Value = reqwest::get(format!("{}/api/status", base))
            .await
            .expect("get status")
            .json()
            .await
            .expect("parse body");
        assert_eq!(body["status"], "operational");
        assert_eq!(body["providers_configured"], 0);
    }

    #[tokio::test]
    async fn test_config_redacts_credentials() {
        use crate::config::{ProviderConfig, ProviderKind};
        let orch = Orchestrator::new(
            vec![ProviderConfig {
                name: "azure-openai".to_string(),
                kind: ProviderKind::AzureOpenAi {
                    endpoint: "https://aoai.example.com".to_string(),
                    api_key: "super-secret".to_string(),
                    deployment: "gpt-4o".to_string(),
                },
            }],
            Settings::default(),
        );
        let base = serve_ephemeral(orch).await;
        let text = reqwest::get(format!("{}/api/config", base))
            .await
            .expect("get config")
            .text()
            .await
            .expect("read body");
        assert!(text.contains("azure-openai"));
        assert!(!text.contains("super-secret"));
    }
}
