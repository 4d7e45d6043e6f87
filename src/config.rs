use anyhow::{Result, anyhow};
use std::time::Duration;

pub const DEFAULT_LABEL: &str = "Dale Play Records";
pub const DEFAULT_GEMINI_MODELS: &[&str] = &[
    "gemini-1.5-flash-latest",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
];
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo";

/// Which language-model backend to talk to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini { api_key: String, models: Vec<String> },
    OpenAi { api_key: String, model: String },
    None,
}

/// Configuration loaded from environment variables
#[derive(Debug)]
pub struct Config {
    pub access_token: String,
    pub user_id: Option<String>,
    pub api_base: String,
    pub market: String,
    pub label: String,
    pub label_variants: Vec<String>,
    pub llm: LlmProvider,
    pub cache_path: String,
    pub activities_file: Option<String>,
    pub deadline: Duration,
}

/// Load configuration from `.env` and environment
pub fn load_config() -> Result<Config> {
    // Load `.env` file if present
    dotenv::dotenv().ok();
    Config::from_lookup(|key| std::env::var(key).ok())
}

impl Config {
    /// Build the configuration from any key lookup (the process environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let access_token = get("SPOTIFY_ACCESS_TOKEN")
            .ok_or_else(|| anyhow!("SPOTIFY_ACCESS_TOKEN is not set"))?;

        let gemini_key = get("GEMINI_API_KEY");
        let openai_key = get("OPENAI_API_KEY");
        let gemini_models = get("GEMINI_MODELS")
            .map(|v| split_list(&v))
            .filter(|models| !models.is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_MODELS.iter().map(|m| m.to_string()).collect());
        let openai_model = get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());

        let llm = match get("LLM_PROVIDER").map(|p| p.to_lowercase()).as_deref() {
            Some("gemini") => LlmProvider::Gemini {
                api_key: gemini_key.ok_or_else(|| anyhow!("LLM_PROVIDER=gemini but GEMINI_API_KEY is not set"))?,
                models: gemini_models,
            },
            Some("openai") => LlmProvider::OpenAi {
                api_key: openai_key.ok_or_else(|| anyhow!("LLM_PROVIDER=openai but OPENAI_API_KEY is not set"))?,
                model: openai_model,
            },
            Some("none") => LlmProvider::None,
            Some(other) => return Err(anyhow!("Unknown LLM_PROVIDER '{other}'")),
            None => match (gemini_key, openai_key) {
                (Some(api_key), _) => LlmProvider::Gemini {
                    api_key,
                    models: gemini_models,
                },
                (None, Some(api_key)) => LlmProvider::OpenAi {
                    api_key,
                    model: openai_model,
                },
                (None, None) => LlmProvider::None,
            },
        };

        let deadline_secs = match get("PIPELINE_DEADLINE_SECS") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|e| anyhow!("Invalid PIPELINE_DEADLINE_SECS '{v}': {e}"))?,
            None => 300,
        };

        Ok(Config {
            access_token,
            user_id: get("SPOTIFY_USER_ID"),
            api_base: get("SPOTIFY_API_BASE")
                .unwrap_or_else(|| "https://api.spotify.com/v1".to_string()),
            market: get("SPOTIFY_MARKET").unwrap_or_else(|| "US".to_string()),
            label: get("LABEL_NAME").unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            label_variants: get("LABEL_VARIANTS").map(|v| split_list(&v)).unwrap_or_default(),
            llm,
            cache_path: get("CATALOG_CACHE_PATH")
                .unwrap_or_else(|| ".catalog-cache.json".to_string()),
            activities_file: get("ACTIVITIES_FILE"),
            deadline: Duration::from_secs(deadline_secs),
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
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
    fn requires_access_token() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("SPOTIFY_ACCESS_TOKEN"));
    }

    #[test]
    fn applies_defaults() {
        let config = Config::from_lookup(lookup_from(&[("SPOTIFY_ACCESS_TOKEN", "tok")])).unwrap();
        assert_eq!(config.label, DEFAULT_LABEL);
        assert_eq!(config.market, "US");
        assert_eq!(config.llm, LlmProvider::None);
        assert_eq!(config.deadline, Duration::from_secs(300));
        assert!(config.user_id.is_none());
    }

    #[test]
    fn picks_gemini_with_model_list_when_key_present() {
        let config = Config::from_lookup(lookup_from(&[
            ("SPOTIFY_ACCESS_TOKEN", "tok"),
            ("GEMINI_API_KEY", "g"),
            ("OPENAI_API_KEY", "o"),
            ("GEMINI_MODELS", "model-a, model-b,"),
            ("LABEL_VARIANTS", "Dale Play, DALE PLAY RECORDS"),
        ]))
        .unwrap();

        assert_eq!(
            config.llm,
            LlmProvider::Gemini {
                api_key: "g".to_string(),
                models: vec!["model-a".to_string(), "model-b".to_string()],
            }
        );
        assert_eq!(config.label_variants, vec!["Dale Play", "DALE PLAY RECORDS"]);
    }

    #[test]
    fn explicit_provider_needs_its_key() {
        let err = Config::from_lookup(lookup_from(&[
            ("SPOTIFY_ACCESS_TOKEN", "tok"),
            ("LLM_PROVIDER", "openai"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn rejects_bad_deadline() {
        assert!(
            Config::from_lookup(lookup_from(&[
                ("SPOTIFY_ACCESS_TOKEN", "tok"),
                ("PIPELINE_DEADLINE_SECS", "soon"),
            ]))
            .is_err()
        );
    }
}
