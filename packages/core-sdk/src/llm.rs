use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{ProviderConfig, ProviderKind};
use crate::models::{ChatQuery, Message};

/** \brief Azure OpenAI REST API 版本。 */
const AZURE_API_VERSION: &str = "2024-08-01-preview";

/** \brief completion 类 Provider 统一使用的系统提示词。 */
const SYSTEM_PROMPT: &str = "You are SageGreen, Swire's renewable energy AI assistant. \
You specialize in wind turbine services, blade maintenance, installation, electrical \
systems, solar energy, and sustainable energy solutions. Provide helpful, technical \
guidance for Swire's renewable energy operations.";

/**
 * \brief 上游调用失败的分类。编排器据此决定退避重试还是换下一个 Provider。
 */
#[derive(Debug, Error)]
pub enum CallError {
    /** \brief 被限流（HTTP 429 或托管服务的 throttling 信号），可退避重试。 */
    #[error("provider rate limited (status {0})")]
    RateLimited(u16),
    /** \brief 配置缺失，Provider 不可用，直接跳过。 */
    #[error("provider not configured")]
    Unavailable,
    /** \brief 其他失败，跳到下一个 Provider。 */
    #[error("provider call failed: {message}")]
    Failed {
        status: Option<u16>,
        message: String,
    },
}

impl CallError {
    pub fn http_status(&self) -> Option<u16> {
        match self {
            CallError::RateLimited(status) => Some(*status),
            CallError::Failed { status, .. } => *status,
            CallError::Unavailable => None,
        }
    }
}

/**
 * \brief 调用一个 Provider，返回回答文本。超时由编排器在外层限定。
 */
pub async fn invoke(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    query: &ChatQuery,
) -> Result<String, CallError> {
    match &provider.kind {
        ProviderKind::Agent {
            endpoint,
            agent_id,
            alias_id,
        } => invoke_agent(client, endpoint, agent_id, alias_id.as_deref(), query).await,
        ProviderKind::AzureOpenAi {
            endpoint,
            api_key,
            deployment,
        } => invoke_azure_openai(client, endpoint, api_key, deployment, query).await,
        ProviderKind::OpenAi {
            api_base,
            api_key,
            model,
        } => invoke_openai(client, api_base, api_key, model, query).await,
    }
}

/**
 * \brief 托管 Agent 服务：POST {endpoint}/agents/{id}/sessions/{session}/text。
 */
async fn invoke_agent(
    client: &reqwest::Client,
    endpoint: &str,
    agent_id: &str,
    alias_id: Option<&str>,
    query: &ChatQuery,
) -> Result<String, CallError> {
    if endpoint.is_empty() || agent_id.is_empty() {
        return Err(CallError::Unavailable);
    }
    let url = format!(
        "{}/agents/{}/sessions/{}/text",
        endpoint.trim_end_matches('/'),
        agent_id,
        query.session_id
    );
    let mut request = client
        .post(url)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .json(&json!({ "inputText": query.text }));
    if let Some(alias) = alias_id {
        request = request.query(&[("aliasId", alias)]);
    }

    let body = send_checked(request).await?;
    extract_agent_completion(&body)
        .ok_or_else(|| failed(None, "agent response carried no completion"))
}

/**
 * \brief Azure OpenAI chat completion 部署。
 */
async fn invoke_azure_openai(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    deployment: &str,
    query: &ChatQuery,
) -> Result<String, CallError> {
    if endpoint.is_empty() || api_key.is_empty() {
        return Err(CallError::Unavailable);
    }
    let url = format!(
        "{}/openai/deployments/{}/chat/completions",
        endpoint.trim_end_matches('/'),
        deployment
    );
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        "api-key",
        HeaderValue::from_str(api_key).map_err(|e| failed(None, &e.to_string()))?,
    );

    let request = client
        .post(url)
        .query(&[("api-version", AZURE_API_VERSION)])
        .headers(headers)
        .json(&chat_payload(query, None));

    let body = send_checked(request).await?;
    Ok(extract_openai_content(&body))
}

/**
 * \brief OpenAI 兼容端点：POST {api_base}/v1/chat/completions。
 */
async fn invoke_openai(
    client: &reqwest::Client,
    api_base: &str,
    api_key: &str,
    model: &str,
    query: &ChatQuery,
) -> Result<String, CallError> {
    if api_key.is_empty() {
        return Err(CallError::Unavailable);
    }
    let url = format!("{}/v1/chat/completions", api_base.trim_end_matches('/'));
    let model = query.model_hint.as_deref().unwrap_or(model);

    let request = client
        .post(url)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .header(AUTHORIZATION, format!("Bearer {}", api_key))
        .json(&chat_payload(query, Some(model)));

    let body = send_checked(request).await?;
    Ok(extract_openai_content(&body))
}

/**
 * \brief 发送请求并把非 2xx 归入错误分类，成功时解析 JSON 响应体。
 */
async fn send_checked(request: reqwest::RequestBuilder) -> Result<Value, CallError> {
    let resp = request
        .send()
        .await
        .map_err(|e| failed(None, &e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(classify_failure(status, &text));
    }
    resp.json()
        .await
        .map_err(|e| failed(Some(status.as_u16()), &e.to_string()))
}

/**
 * \brief 失败分类：429 与托管服务的 ThrottlingException 都算限流。
 */
fn classify_failure(status: StatusCode, body: &str) -> CallError {
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("ThrottlingException") {
        return CallError::RateLimited(status.as_u16());
    }
    failed(
        Some(status.as_u16()),
        &format!("{} -> {}", status, truncate(body, 200)),
    )
}

fn failed(status: Option<u16>, message: &str) -> CallError {
    CallError::Failed {
        status,
        message: message.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn chat_payload(query: &ChatQuery, model: Option<&str>) -> Value {
    let messages = vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(query.text.clone()),
    ];
    let mut body = json!({
        "messages": messages,
        "max_tokens": 2000,
        "temperature": 0.7,
        "top_p": 0.95
    });
    if let Some(model) = model {
        body["model"] = json!(model);
    }
    body
}

fn extract_agent_completion(v: &Value) -> Option<String> {
    v.get("completion")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
}

fn extract_openai_content(v: &Value) -> String {
    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string()
}
