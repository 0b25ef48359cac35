//! Runtime configuration from the environment

use std::path::PathBuf;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_MAX_TOOL_RETRIES: u32 = 2;
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct KueryConfig {
    /// SQLite file holding exported flows
    pub db_path: PathBuf,
    /// Namespace used when a tool call names none
    pub namespace: String,
    /// Consecutive failed or blocked calls tolerated per tool
    pub max_tool_retries: u32,
    /// Messages kept between loop iterations; 0 keeps everything
    pub history_limit: usize,
    pub system_prompt_file: Option<PathBuf>,
    pub kubectl: String,
    pub helm: String,
}

impl KueryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_path = non_empty("KUERY_DB_PATH").map_or_else(
            || {
                let home = non_empty("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".kuery").join("flows.db")
            },
            PathBuf::from,
        );

        Self {
            db_path,
            namespace: non_empty("KUERY_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            max_tool_retries: parse_or(
                "KUERY_MAX_TOOL_RETRIES",
                non_empty("KUERY_MAX_TOOL_RETRIES"),
                DEFAULT_MAX_TOOL_RETRIES,
            ),
            history_limit: parse_or(
                "KUERY_HISTORY_LIMIT",
                non_empty("KUERY_HISTORY_LIMIT"),
                DEFAULT_HISTORY_LIMIT,
            ),
            system_prompt_file: non_empty("KUERY_SYSTEM_PROMPT_FILE").map(PathBuf::from),
            kubectl: non_empty("KUERY_KUBECTL").unwrap_or_else(|| "kubectl".to_string()),
            helm: non_empty("KUERY_HELM").unwrap_or_else(|| "helm".to_string()),
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(
    key: &str,
    value: Option<String>,
    default: T,
) -> T {
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Ignoring invalid setting");
            default
        }),
    }
}
