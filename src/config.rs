use anyhow::{Context, Result};
use std::time::Duration;

use crate::models::DEFAULT_LOAD_LIMIT;
use crate::queue::DEFAULT_TTL;

const DEFAULT_VISION_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_VISION_MODEL: &str = "gpt-4o-mini";

/// Application configuration loaded from environment variables (and `.env`).
/// Service credentials are optional here; each command checks for the ones it needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Warehouse
    pub project_id: Option<String>,
    pub dataset_id: Option<String>,
    pub table_id: Option<String>,
    pub bigquery_access_token: Option<String>,

    // Vision model
    pub vision_api_url: String,
    pub vision_api_key: Option<String>,
    pub vision_model: String,

    // Search
    pub search_api_key: Option<String>,
    pub search_engine_id: Option<String>,

    // Queue
    pub queue_ttl: Duration,
    pub queue_load_limit: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let queue_ttl = match get("QUEUE_TTL_SECS") {
            Some(v) => Duration::from_secs(
                v.trim()
                    .parse()
                    .context("QUEUE_TTL_SECS must be a whole number of seconds")?,
            ),
            None => DEFAULT_TTL,
        };
        let queue_load_limit = match get("QUEUE_LOAD_LIMIT") {
            Some(v) => v
                .trim()
                .parse()
                .context("QUEUE_LOAD_LIMIT must be a positive number")?,
            None => DEFAULT_LOAD_LIMIT,
        };
        if queue_load_limit == 0 {
            anyhow::bail!("QUEUE_LOAD_LIMIT must be a positive number");
        }

        Ok(Self {
            project_id: get("PROJECT_ID"),
            dataset_id: get("DATASET_ID"),
            table_id: get("TABLE_ID"),
            bigquery_access_token: get("BIGQUERY_ACCESS_TOKEN"),
            vision_api_url: get("VISION_API_URL")
                .unwrap_or_else(|| DEFAULT_VISION_API_URL.to_string()),
            vision_api_key: get("VISION_API_KEY"),
            vision_model: get("VISION_MODEL").unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            search_api_key: get("GOOGLE_SEARCH_API_KEY"),
            search_engine_id: get("GOOGLE_CUSTOM_SEARCH_ENGINE_ID"),
            queue_ttl,
            queue_load_limit,
        })
    }

    /// `(project, dataset, table, token)` or an error naming the first missing variable
    pub fn bigquery(&self) -> Result<(&str, &str, &str, &str)> {
        Ok((
            required(&self.project_id, "PROJECT_ID")?,
            required(&self.dataset_id, "DATASET_ID")?,
            required(&self.table_id, "TABLE_ID")?,
            required(&self.bigquery_access_token, "BIGQUERY_ACCESS_TOKEN")?,
        ))
    }

    pub fn vision_key(&self) -> Result<&str> {
        required(&self.vision_api_key, "VISION_API_KEY")
    }

    pub fn search(&self) -> Result<(&str, &str)> {
        Ok((
            required(&self.search_api_key, "GOOGLE_SEARCH_API_KEY")?,
            required(&self.search_engine_id, "GOOGLE_CUSTOM_SEARCH_ENGINE_ID")?,
        ))
    }

    fn log_keys(&self) {
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) => {
                    let n = v.chars().take(5).collect::<String>();
                    format!("{}...({} chars)", n, v.len())
                }
                None => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  PROJECT_ID: {}", self.project_id.as_deref().unwrap_or("<not set>"));
        tracing::info!(
            "  TABLE: {}.{}",
            self.dataset_id.as_deref().unwrap_or("?"),
            self.table_id.as_deref().unwrap_or("?")
        );
        tracing::info!("  BIGQUERY_ACCESS_TOKEN: {}", preview_opt(&self.bigquery_access_token));
        tracing::info!("  VISION_API_KEY: {}", preview_opt(&self.vision_api_key));
        tracing::info!("  VISION_MODEL: {}", self.vision_model);
        tracing::info!("  GOOGLE_SEARCH_API_KEY: {}", preview_opt(&self.search_api_key));
    }
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("{} environment variable is required", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.queue_ttl, Duration::from_secs(300));
        assert_eq!(cfg.queue_load_limit, 100);
        assert_eq!(cfg.vision_model, "gpt-4o-mini");
        assert_eq!(cfg.vision_api_url, "https://api.openai.com/v1");
    }

    #[test]
    fn bigquery_reports_missing_variable() {
        let cfg = config(&[("PROJECT_ID", "proj"), ("DATASET_ID", "data")]).unwrap();
        let err = cfg.bigquery().unwrap_err().to_string();
        assert!(err.contains("TABLE_ID"), "{}", err);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = config(&[("VISION_API_KEY", "  ")]).unwrap();
        assert!(cfg.vision_key().is_err());
    }

    #[test]
    fn queue_settings_parse() {
        let cfg = config(&[("QUEUE_TTL_SECS", "30"), ("QUEUE_LOAD_LIMIT", "25")]).unwrap();
        assert_eq!(cfg.queue_ttl, Duration::from_secs(30));
        assert_eq!(cfg.queue_load_limit, 25);
        assert!(config(&[("QUEUE_LOAD_LIMIT", "0")]).is_err());
        assert!(config(&[("QUEUE_TTL_SECS", "soon")]).is_err());
    }
}
