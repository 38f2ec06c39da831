//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::extraction::{DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiConfig};
use crate::store::DB_PATH;

pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_USER: &str = "local";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    /// The account whose tasks this process serves.
    pub user_id: String,
    pub gemini: GeminiConfig,
}

impl AppConfig {
    /// Load from process environment variables.
    ///
    /// # Errors
    /// Returns an error if `TASKFLOW_ADDR` is not a valid socket address.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup. Blank values count as unset.
    ///
    /// # Errors
    /// Returns an error if the address value cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let raw_addr = get("TASKFLOW_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr: SocketAddr = raw_addr
            .parse()
            .with_context(|| format!("invalid TASKFLOW_ADDR: {raw_addr}"))?;

        Ok(Self {
            addr,
            db_path: get("TASKFLOW_DB_PATH").unwrap_or_else(|| DB_PATH.to_string()).into(),
            user_id: get("TASKFLOW_USER").unwrap_or_else(|| DEFAULT_USER.to_string()),
            gemini: GeminiConfig {
                api_key: get("GEMINI_API_KEY"),
                model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap_or_else(|err| panic!("config: {err}"));
        assert_eq!(config.addr.to_string(), DEFAULT_ADDR);
        assert_eq!(config.db_path, PathBuf::from(DB_PATH));
        assert_eq!(config.user_id, DEFAULT_USER);
        assert_eq!(config.gemini, GeminiConfig::default());
    }

    #[test]
    fn overrides_are_read_and_blank_values_ignored() {
        let config = AppConfig::from_lookup(lookup(&[
            ("TASKFLOW_ADDR", "0.0.0.0:8080"),
            ("TASKFLOW_USER", "  "),
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_MODEL", "gemini-pro"),
        ]))
        .unwrap_or_else(|err| panic!("config: {err}"));
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.user_id, DEFAULT_USER);
        assert_eq!(config.gemini.api_key.as_deref(), Some("k"));
        assert_eq!(config.gemini.model, "gemini-pro");
    }

    #[test]
    fn bad_address_is_an_error() {
        let err = AppConfig::from_lookup(lookup(&[("TASKFLOW_ADDR", "nowhere")])).err();
        assert!(err.is_some_and(|e| e.to_string().contains("TASKFLOW_ADDR")));
    }
}
