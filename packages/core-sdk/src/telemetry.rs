use std::{fs::OpenOptions, io::Write, path::PathBuf};

use anyhow::Result;
use once_cell::sync::Lazy;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::models::ProviderAttempt;

static TELEMETRY_ENABLED: Lazy<std::sync::RwLock<bool>> =
    Lazy::new(|| std::sync::RwLock::new(false));

/**
 * \brief 按 SAGEGREEN_TELEMETRY 环境变量初始化遥测开关。
 */
pub fn init_from_env() {
    let enabled = std::env::var("SAGEGREEN_TELEMETRY")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    set_enabled(enabled);
}

/**
 * \brief 更新遥测开关状态。
 */
pub fn set_enabled(enabled: bool) {
    if let Ok(mut guard) = TELEMETRY_ENABLED.write() {
        *guard = enabled;
    }
}

/**
 * \brief 查询当前遥测开关状态。
 */
pub fn is_enabled() -> bool {
    TELEMETRY_ENABLED.read().map(|g| *g).unwrap_or(false)
}

/**
 * \brief 记录常规事件。
 */
pub fn log_event(category: &str, message: &str) {
    if !is_enabled() {
        return;
    }
    if let Err(err) = write_line("INFO", category, message) {
        eprintln!("telemetry write failed: {}", err);
    }
}

/**
 * \brief 记录错误事件。
 */
pub fn log_error(category: &str, message: &str) {
    if !is_enabled() {
        return;
    }
    if let Err(err) = write_line("ERROR", category, message) {
        eprintln!("telemetry write failed: {}", err);
    }
}

/**
 * \brief 把一次查询的全部上游尝试压成一行记录，时间为相对首次调用的偏移。
 * 形如：session=s-1 resolved=azure-openai agent-service:rate_limited(429)@+0ms azure-openai:success(200)@+1003ms
 */
pub fn log_attempts(session_id: &str, resolved_source: &str, attempts: &[ProviderAttempt]) {
    if !is_enabled() {
        return;
    }
    let base = attempts.first().map(|a| a.started_at);
    let trace = attempts
        .iter()
        .map(|a| {
            let offset_ms = base
                .map(|b| a.started_at.duration_since(b).as_millis())
                .unwrap_or(0);
            match a.http_status {
                Some(status) => format!(
                    "{}:{}({})@+{}ms",
                    a.provider,
                    a.outcome.as_str(),
                    status,
                    offset_ms
                ),
                None => format!("{}:{}@+{}ms", a.provider, a.outcome.as_str(), offset_ms),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    log_event(
        "orchestrator",
        &format!(
            "session={} resolved={} {}",
            session_id, resolved_source, trace
        ),
    );
}

fn write_line(level: &str, category: &str, message: &str) -> Result<()> {
    let log_dir = PathBuf::from("logs");
    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)?;
    }
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("sagegreen.log"))?;
    writeln!(file, "{} [{}] {} - {}", timestamp, level, category, message)?;
    Ok(())
}
