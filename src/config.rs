use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::errors::ConfigError;

const API_KEY_PLACEHOLDER: &str = "your-openai-api-key-here";

/// Process-wide settings read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_v1_str: String,
    pub project_name: String,
    pub cors_origins: Vec<String>,
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub service_name: String,
    pub log_level: String,
    pub loki_enabled: bool,
    pub loki_url: Option<String>,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub llm_temperature: f32,
    pub execution_timeout: Duration,
    pub max_consecutive_auto_reply: usize,
    pub code_work_dir: PathBuf,
    pub static_dir: PathBuf,
    pub plot_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
        if openai_api_key == API_KEY_PLACEHOLDER {
            return Err(ConfigError::Placeholder("OPENAI_API_KEY"));
        }

        let static_dir = PathBuf::from(get("STATIC_DIR", "static"));
        let plot_dir = lookup("PLOT_FOLDER")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| static_dir.join("plots"));

        let execution_timeout_secs: u64 = parse("EXECUTION_TIMEOUT_SECS", &get("EXECUTION_TIMEOUT_SECS", "60"))?;
        if execution_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "EXECUTION_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            api_v1_str: get("API_V1_STR", "/api/v1"),
            project_name: get("PROJECT_NAME", "Stock Analysis API"),
            cors_origins: parse_cors_origins(&get("BACKEND_CORS_ORIGINS", "*")),
            host: get("HOST", "0.0.0.0"),
            port: parse("PORT", &get("PORT", "8000"))?,
            environment: get("ENVIRONMENT", "development"),
            service_name: get("SERVICE_NAME", "stock-analyst"),
            log_level: get("RUST_LOG", "info"),
            loki_enabled: parse("LOKI_ENABLED", &get("LOKI_ENABLED", "false"))?,
            loki_url: lookup("LOKI_URL").filter(|v| !v.trim().is_empty()),
            openai_api_key,
            openai_model: get("OPENAI_MODEL", "gpt-4-turbo-preview"),
            openai_base_url: get("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            llm_temperature: parse("LLM_TEMPERATURE", &get("LLM_TEMPERATURE", "0.7"))?,
            execution_timeout: Duration::from_secs(execution_timeout_secs),
            max_consecutive_auto_reply: parse(
                "MAX_CONSECUTIVE_AUTO_REPLY",
                &get("MAX_CONSECUTIVE_AUTO_REPLY", "3"),
            )?,
            code_work_dir: PathBuf::from(get("CODE_WORK_DIR", "coding")),
            static_dir,
            plot_dir,
        })
    }

    /// Create the static, plot and sandbox root directories if missing.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.static_dir, &self.plot_dir, &self.code_work_dir] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Directory {
                path: dir.display().to_string(),
                source,
            })?;
        }
        info!(
            "📁 Directories ready: static={}, plots={}, sandboxes={}",
            self.static_dir.display(),
            self.plot_dir.display(),
            self.code_work_dir.display()
        );
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

/// Accepts `*`, a comma-separated list, or a JSON-style `["a","b"]` list.
fn parse_cors_origins(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
            return list;
        }
    }
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let result = Settings::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ConfigError::Missing("OPENAI_API_KEY"))));
    }

    #[test]
    fn test_placeholder_api_key_is_fatal() {
        let result = Settings::from_lookup(lookup_from(&[("OPENAI_API_KEY", API_KEY_PLACEHOLDER)]));
        assert!(matches!(result, Err(ConfigError::Placeholder(_))));
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(settings.api_v1_str, "/api/v1");
        assert_eq!(settings.openai_model, "gpt-4-turbo-preview");
        assert_eq!(settings.execution_timeout, Duration::from_secs(60));
        assert_eq!(settings.max_consecutive_auto_reply, 3);
        assert_eq!(settings.plot_dir, PathBuf::from("static").join("plots"));
        assert_eq!(settings.cors_origins, vec!["*".to_string()]);
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.service_name, "stock-analyst");
        assert_eq!(settings.log_level, "info");
        assert!(!settings.loki_enabled);
        assert_eq!(settings.loki_url, None);
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let result = Settings::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("EXECUTION_TIMEOUT_SECS", "soon"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { key: "EXECUTION_TIMEOUT_SECS", .. })));
    }

    #[test]
    fn test_cors_origins_list_forms() {
        assert_eq!(
            parse_cors_origins("http://a.test, http://b.test"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert_eq!(
            parse_cors_origins(r#"["http://a.test"]"#),
            vec!["http://a.test".to_string()]
        );
    }

    #[test]
    fn test_ensure_dirs_creates_plot_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let static_dir = tmp.path().join("static");
        let work_dir = tmp.path().join("coding");
        let settings = Settings::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("STATIC_DIR", static_dir.to_str().unwrap()),
            ("CODE_WORK_DIR", work_dir.to_str().unwrap()),
        ]))
        .unwrap();

        settings.ensure_dirs().unwrap();
        assert!(static_dir.join("plots").is_dir());
        assert!(work_dir.is_dir());
    }
}
