use crate::nav;
use chrono::{FixedOffset, Offset, Utc};
use std::env;
use std::time::Duration;

/// Interval between whole-dashboard refreshes.
pub const DASHBOARD_REFRESH: Duration = Duration::from_secs(30);
/// Interval between refreshes of one machine's scan log.
pub const SCAN_LOG_REFRESH: Duration = Duration::from_secs(10);
/// A scan-log watch with no reader for this long stops polling.
pub const SCAN_LOG_IDLE: Duration = Duration::from_secs(60);

pub struct AppConfig {
    pub backend_url: String,
    pub http_bind: String,
    pub card_summary_path: Option<String>,
    pub display_offset: FixedOffset,
    pub backend_timeout: Option<Duration>,
    pub context: DashboardContext,
}

/// Page-level context that used to live in a page global. Built once and
/// handed to whatever needs it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DashboardContext {
    pub department: String,
    pub view_type: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let offset_hours: i32 = env_var("DISPLAY_UTC_OFFSET_HOURS", "7").parse().unwrap_or(7);
        let summary_path = env_var("CARD_SUMMARY_PATH", "/api/machine/{machine_no}/summary/");
        Self {
            backend_url: env_var("BACKEND_URL", "http://127.0.0.1:8000")
                .trim_end_matches('/')
                .to_string(),
            http_bind: env_var("HTTP_BIND", "0.0.0.0:8080"),
            card_summary_path: if summary_path.trim().is_empty() {
                None
            } else {
                Some(summary_path)
            },
            display_offset: display_offset(offset_hours),
            backend_timeout: env::var("BACKEND_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            context: DashboardContext {
                department: env_var("DASHBOARD_DEPARTMENT", "Overall"),
                view_type: env_var("DASHBOARD_VIEW", "machine"),
            },
        }
    }

    /// Absolute summary URL for one machine card, if summaries are enabled.
    pub fn summary_url(&self, machine_no: &str) -> Option<String> {
        self.card_summary_path.as_ref().map(|template| {
            let path = template.replace("{machine_no}", &nav::encode_segment(machine_no));
            if path.starts_with("http://") || path.starts_with("https://") {
                path
            } else {
                format!("{}{}", self.backend_url, path)
            }
        })
    }
}

fn display_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours.clamp(-23, 23) * 3600).unwrap_or_else(|| Utc.fix())
}

fn env_var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
pub fn test_config() -> AppConfig {
    AppConfig {
        backend_url: "http://backend.test".to_string(),
        http_bind: "127.0.0.1:0".to_string(),
        card_summary_path: Some("/api/machine/{machine_no}/summary/".to_string()),
        display_offset: display_offset(7),
        backend_timeout: None,
        context: DashboardContext {
            department: "Overall".to_string(),
            view_type: "machine".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_url_joins_backend_and_encodes_machine() {
        let config = test_config();
        assert_eq!(
            config.summary_url("MC 01").as_deref(),
            Some("http://backend.test/api/machine/MC%2001/summary/")
        );
    }

    #[test]
    fn summary_url_disabled_without_template() {
        let mut config = test_config();
        config.card_summary_path = None;
        assert!(config.summary_url("MC-01").is_none());
    }

    #[test]
    fn offset_is_clamped() {
        assert_eq!(display_offset(7).local_minus_utc(), 7 * 3600);
        assert_eq!(display_offset(99).local_minus_utc(), 23 * 3600);
    }
}
