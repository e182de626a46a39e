use serde::{Deserialize, Serialize};
use std::time::Instant;

/**
 * \brief 单次用户查询。每条用户消息构造一个，随请求结束丢弃。
 */
#[derive(Debug, Clone)]
pub struct ChatQuery {
    /** \brief 查询文本 */
    pub text: String,
    /** \brief 会话标识，用于 Agent 服务的连续对话 */
    pub session_id: String,
    /** \brief 模型提示（可选，透传给 completion 类 Provider） */
    pub model_hint: Option<String>,
    /** \brief 固定使用指定 Provider（可选，按名称匹配） */
    pub force_provider: Option<String>,
}

impl ChatQuery {
    pub fn new(text: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: session_id.into(),
            model_hint: None,
            force_provider: None,
        }
    }
}

/**
 * \brief 消息结构，与 OpenAI Chat 消息格式对齐。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /** \brief 角色：system/user/assistant */
    pub role: String,
    /** \brief 内容 */
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/** \brief 单次上游调用的结局分类。 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Error,
    Timeout,
    RateLimited,
}

impl AttemptOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Error => "error",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::RateLimited => "rate_limited",
        }
    }
}

/**
 * \brief 编排器内部每次上游调用的记录，仅用于遥测，请求结束后丢弃。
 */
#[derive(Debug, Clone)]
pub struct ProviderAttempt {
    /** \brief Provider 名称 */
    pub provider: String,
    /** \brief 调用发起时刻 */
    pub started_at: Instant,
    /** \brief 结局 */
    pub outcome: AttemptOutcome,
    /** \brief 上游返回的 HTTP 状态码（若有） */
    pub http_status: Option<u16>,
}

/**
 * \brief 返回给调用方的最终回答。服务端不持久化。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /** \brief 回答文本 */
    pub response: String,
    /** \brief 产生回答的环节（Provider 名称或 "final-fallback"） */
    pub source: String,
    /** \brief 会话标识回显 */
    pub session_id: String,
    /** \brief 实际使用的模型（completion 类 Provider 才有） */
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}
