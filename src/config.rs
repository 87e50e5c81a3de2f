use anyhow::{anyhow, Result};

const DEFAULT_CLASSIFY_MODEL: &str = "gpt-4-0125-preview";
const DEFAULT_EXTRACT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_COMMITTEE_DB: &str = "data/committees.sqlite";

/// Environment-backed settings. Keys are only demanded by the commands that need them.
#[derive(Debug, Clone)]
pub struct Settings {
    pub classify_model: String,
    pub extract_model: String,
    pub committee_db: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Settings {
            classify_model: env_or("CLASSIFY_MODEL", DEFAULT_CLASSIFY_MODEL),
            extract_model: env_or("EXTRACT_MODEL", DEFAULT_EXTRACT_MODEL),
            committee_db: env_or("COMMITTEE_DB", DEFAULT_COMMITTEE_DB),
        }
    }

    pub fn openai_api_key(&self) -> Result<String> {
        require("OPENAI_API_KEY")
    }

    pub fn valueserp_api_key(&self) -> Result<String> {
        require("VALUESERP_API_KEY")
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn require(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{} environment variable must be set", name))
}
