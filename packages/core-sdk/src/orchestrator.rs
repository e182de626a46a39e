use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

use crate::canned;
use crate::config::{provider_chain_from_env, ProviderConfig, Settings};
use crate::llm::{self, CallError};
use crate::models::{AttemptOutcome, ChatQuery, ChatResponse, ProviderAttempt};
use crate::telemetry;

/** \brief 所有 Provider 失败后兜底回答的 source 标记。 */
pub const FINAL_FALLBACK_SOURCE: &str = "final-fallback";

/**
 * \brief 首位 Provider 的最小调用间隔闸门。
 *
 * 上次调用时刻由异步互斥锁保护；锁跨越等待期间持有，从而把并发请求
 * 对首位 Provider 的调用串行化并保证间隔下限。
 */
pub struct MinInterval {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl MinInterval {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /**
     * \brief 等到距离上次放行至少 interval，然后记录本次放行时刻。
     */
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/**
 * \brief Provider 回退编排器。
 *
 * 对一次查询：按优先级逐个调用 Provider；429 在同一 Provider 上指数退避
 * 重试；其余失败立即换下一个；全部失败则查静态兜底表。该路径永不报错，
 * 每次查询恰好产生一个回答。
 */
pub struct Orchestrator {
    chain: Vec<ProviderConfig>,
    settings: Settings,
    spacing: MinInterval,
    client: reqwest::Client,
}

impl Orchestrator {
    pub fn new(chain: Vec<ProviderConfig>, settings: Settings) -> Self {
        let spacing = MinInterval::new(settings.min_interval);
        Self {
            chain,
            settings,
            spacing,
            client: reqwest::Client::new(),
        }
    }

    /** \brief 从环境变量组装调用链与参数。 */
    pub fn from_env() -> Self {
        Self::new(provider_chain_from_env(), Settings::from_env())
    }

    pub fn chain(&self) -> &[ProviderConfig] {
        &self.chain
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    /**
     * \brief 回答一次查询。线性状态机：逐个 Provider 尝试，首个非空成功
     * 即返回，否则落到静态兜底。
     */
    pub async fn answer(&self, query: &ChatQuery) -> ChatResponse {
        let mut attempts: Vec<ProviderAttempt> = Vec::new();
        let primary_name = self.chain.first().map(|p| p.name.clone());

        for provider in self.selected_providers(query) {
            if let Some(text) = self
                .try_provider(provider, query, primary_name.as_deref(), &mut attempts)
                .await
            {
                telemetry::log_attempts(&query.session_id, &provider.name, &attempts);
                return ChatResponse {
                    response: text,
                    source: provider.name.clone(),
                    session_id: query.session_id.clone(),
                    model: provider.model_label(),
                };
            }
        }

        telemetry::log_attempts(&query.session_id, FINAL_FALLBACK_SOURCE, &attempts);
        ChatResponse {
            response: canned::lookup(&query.text).to_string(),
            source: FINAL_FALLBACK_SOURCE.to_string(),
            session_id: query.session_id.clone(),
            model: None,
        }
    }

    /** \brief 链的视图：指定 force_provider 时只保留同名 Provider。 */
    fn selected_providers(&self, query: &ChatQuery) -> Vec<&ProviderConfig> {
        match &query.force_provider {
            Some(name) => self.chain.iter().filter(|p| &p.name == name).collect(),
            None => self.chain.iter().collect(),
        }
    }

    /**
     * \brief 在单个 Provider 上完成一轮调用（含 429 退避重试）。
     * 成功且非空时返回文本，否则返回 None 交给下一个 Provider。
     */
    async fn try_provider(
        &self,
        provider: &ProviderConfig,
        query: &ChatQuery,
        primary_name: Option<&str>,
        attempts: &mut Vec<ProviderAttempt>,
    ) -> Option<String> {
        let is_primary = primary_name == Some(provider.name.as_str());

        for attempt in 0..=self.settings.retry_budget {
            if is_primary {
                self.spacing.acquire().await;
            }
            let started_at = Instant::now();

            let outcome = timeout(
                self.settings.call_timeout,
                llm::invoke(&self.client, provider, query),
            )
            .await;

            match outcome {
                Err(_) => {
                    attempts.push(ProviderAttempt {
                        provider: provider.name.clone(),
                        started_at,
                        outcome: AttemptOutcome::Timeout,
                        http_status: None,
                    });
                    return None;
                }
                Ok(Err(CallError::RateLimited(status))) => {
                    attempts.push(ProviderAttempt {
                        provider: provider.name.clone(),
                        started_at,
                        outcome: AttemptOutcome::RateLimited,
                        http_status: Some(status),
                    });
                    if attempt < self.settings.retry_budget {
                        // 1x, 2x, 4x ...
                        sleep(self.settings.backoff_base * (1u32 << attempt)).await;
                        continue;
                    }
                    return None;
                }
                Ok(Err(err)) => {
                    attempts.push(ProviderAttempt {
                        provider: provider.name.clone(),
                        started_at,
                        outcome: AttemptOutcome::Error,
                        http_status: err.http_status(),
                    });
                    return None;
                }
                Ok(Ok(text)) => {
                    if text.trim().is_empty() {
                        attempts.push(ProviderAttempt {
                            provider: provider.name.clone(),
                            started_at,
                            outcome: AttemptOutcome::Error,
                            http_status: None,
                        });
                        return None;
                    }
                    attempts.push(ProviderAttempt {
                        provider: provider.name.clone(),
                        started_at,
                        outcome: AttemptOutcome::Success,
                        http_status: Some(200),
                    });
                    return Some(text);
                }
            }
        }
        None
    }
}
