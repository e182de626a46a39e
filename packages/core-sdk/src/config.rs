use std::env;
use std::time::Duration;

/** \brief Azure OpenAI 默认部署名。 */
const DEFAULT_AZURE_DEPLOYMENT: &str = "gpt-4o";
/** \brief OpenAI 兼容端点默认基地址与模型。 */
const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/**
 * \brief Provider 种类与其接入参数。凭据缺失的 Provider 不会进入调用链。
 */
#[derive(Debug, Clone)]
pub enum ProviderKind {
    /** \brief 托管 Agent 服务（会话式，带知识库）。 */
    Agent {
        endpoint: String,
        agent_id: String,
        alias_id: Option<String>,
    },
    /** \brief Azure OpenAI chat completion 部署。 */
    AzureOpenAi {
        endpoint: String,
        api_key: String,
        deployment: String,
    },
    /** \brief OpenAI 兼容 chat completion 端点。 */
    OpenAi {
        api_base: String,
        api_key: String,
        model: String,
    },
}

impl ProviderKind {
    pub const fn label(&self) -> &'static str {
        match self {
            ProviderKind::Agent { .. } => "agent",
            ProviderKind::AzureOpenAi { .. } => "azure-openai",
            ProviderKind::OpenAi { .. } => "openai",
        }
    }
}

/**
 * \brief 调用链中的一个 Provider。
 */
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /** \brief 链内唯一名称，也是响应里的 source 标记 */
    pub name: String,
    pub kind: ProviderKind,
}

impl ProviderConfig {
    /** \brief completion 类 Provider 的模型标识（Agent 无模型概念）。 */
    pub fn model_label(&self) -> Option<String> {
        match &self.kind {
            ProviderKind::Agent { .. } => None,
            ProviderKind::AzureOpenAi { deployment, .. } => Some(deployment.clone()),
            ProviderKind::OpenAi { model, .. } => Some(model.clone()),
        }
    }

    /** \brief 去除凭据后的端点描述，用于 /api/config 与 CLI 展示。 */
    pub fn redacted_endpoint(&self) -> String {
        match &self.kind {
            ProviderKind::Agent {
                endpoint, agent_id, ..
            } => format!("{} (agent {})", endpoint, agent_id),
            ProviderKind::AzureOpenAi {
                endpoint,
                deployment,
                ..
            } => format!("{} (deployment {})", endpoint, deployment),
            ProviderKind::OpenAi { api_base, model, .. } => {
                format!("{} (model {})", api_base, model)
            }
        }
    }
}

/**
 * \brief 编排器参数。默认值即规格值；测试用毫秒级覆盖。
 */
#[derive(Debug, Clone)]
pub struct Settings {
    /** \brief 单次上游调用的超时上限 */
    pub call_timeout: Duration,
    /** \brief 429 重试预算（同一 Provider 最多再试几次） */
    pub retry_budget: u32,
    /** \brief 指数退避基数：1x, 2x, 4x */
    pub backoff_base: Duration,
    /** \brief 首位 Provider 相邻两次调用的最小间隔 */
    pub min_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(25),
            retry_budget: 3,
            backoff_base: Duration::from_secs(1),
            min_interval: Duration::from_millis(1500),
        }
    }
}

impl Settings {
    /**
     * \brief 从环境变量读取可覆盖项，解析失败回落默认值。
     */
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(secs) = env_parse::<u64>("SAGEGREEN_TIMEOUT_SECS") {
            settings.call_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("SAGEGREEN_MIN_INTERVAL_MS") {
            settings.min_interval = Duration::from_millis(ms);
        }
        settings
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/**
 * \brief 按优先级组装 Provider 调用链：Agent -> Azure OpenAI -> OpenAI 兼容。
 *
 * 某一 Provider 的必需变量缺失时直接跳过（视为 unavailable）。空链是合法的，
 * 所有查询都会走静态兜底。
 */
pub fn provider_chain_from_env() -> Vec<ProviderConfig> {
    provider_chain_from(|key| env::var(key).ok())
}

/** \brief 可注入取值函数的组装逻辑，便于测试。 */
pub fn provider_chain_from(get: impl Fn(&str) -> Option<String>) -> Vec<ProviderConfig> {
    let mut chain = Vec::new();

    if let (Some(endpoint), Some(agent_id)) = (
        get("SAGEGREEN_AGENT_ENDPOINT"),
        get("SAGEGREEN_AGENT_ID"),
    ) {
        chain.push(ProviderConfig {
            name: "agent-service".to_string(),
            kind: ProviderKind::Agent {
                endpoint,
                agent_id,
                alias_id: get("SAGEGREEN_AGENT_ALIAS_ID"),
            },
        });
    }

    if let (Some(endpoint), Some(api_key)) =
        (get("AZURE_OPENAI_ENDPOINT"), get("AZURE_OPENAI_KEY"))
    {
        chain.push(ProviderConfig {
            name: "azure-openai".to_string(),
            kind: ProviderKind::AzureOpenAi {
                endpoint,
                api_key,
                deployment: get("AZURE_OPENAI_DEPLOYMENT")
                    .unwrap_or_else(|| DEFAULT_AZURE_DEPLOYMENT.to_string()),
            },
        });
    }

    if let Some(api_key) = get("OPENAI_API_KEY") {
        chain.push(ProviderConfig {
            name: "openai".to_string(),
            kind: ProviderKind::OpenAi {
                api_base: get("OPENAI_API_BASE")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE.to_string()),
                api_key,
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            },
        });
    }

    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn chain_for(vars: &[(&str, &str)]) -> Vec<ProviderConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        provider_chain_from(|key| map.get(key).cloned())
    }

    #[test]
    fn test_empty_env_builds_empty_chain() {
        assert!(chain_for(&[]).is_empty());
    }

    #[test]
    fn test_partial_credentials_skip_provider() {
        // Agent 缺少 SAGEGREEN_AGENT_ID，Azure 缺少密钥：两者都不可用。
        let chain = chain_for(&[
            ("SAGEGREEN_AGENT_ENDPOINT", "https://agents.example.com"),
            ("AZURE_OPENAI_ENDPOINT", "https://aoai.example.com"),
        ]);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_full_chain_order_and_defaults() {
        let chain = chain_for(&[
            ("SAGEGREEN_AGENT_ENDPOINT", "https://agents.example.com"),
            ("SAGEGREEN_AGENT_ID", "XMJHPK00RO"),
            ("AZURE_OPENAI_ENDPOINT", "https://aoai.example.com"),
            ("AZURE_OPENAI_KEY", "key-1"),
            ("OPENAI_API_KEY", "sk-1"),
        ]);
        let names: Vec<&str> = chain.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["agent-service", "azure-openai", "openai"]);

        match &chain[1].kind {
            ProviderKind::AzureOpenAi { deployment, .. } => {
                assert_eq!(deployment, DEFAULT_AZURE_DEPLOYMENT)
            }
            other => panic!("unexpected kind: {:?}", other),
        }
        match &chain[2].kind {
            ProviderKind::OpenAi { api_base, model, .. } => {
                assert_eq!(api_base, DEFAULT_OPENAI_BASE);
                assert_eq!(model, DEFAULT_OPENAI_MODEL);
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_redacted_endpoint_hides_keys() {
        let chain = chain_for(&[
            ("AZURE_OPENAI_ENDPOINT", "https://aoai.example.com"),
            ("AZURE_OPENAI_KEY", "super-secret"),
        ]);
        assert!(!chain[0].redacted_endpoint().contains("super-secret"));
    }
}
