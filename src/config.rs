//! Configuration loader: merges env vars, .env file, and screener.toml.

use std::path::Path;

use common::{Error, ScreenerConfig};

const CONFIG_FILE: &str = "screener.toml";

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

pub fn validate_config(config: &ScreenerConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    match url::Url::parse(&config.api_base_url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
            if parsed.query().is_some() || parsed.fragment().is_some() {
                issues.push("api_base_url must not carry a query or fragment".into());
            }
        }
        Ok(parsed) => issues.push(format!(
            "api_base_url must use http or https, got {}",
            parsed.scheme()
        )),
        Err(e) => issues.push(format!("api_base_url is not a valid URL: {e}")),
    }

    if config.request_timeout_secs == 0 {
        issues.push("request_timeout_secs must be > 0".into());
    }
    if config.user_agent.trim().is_empty() {
        issues.push("user_agent must not be empty".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load client configuration from the environment and an optional config file.
pub fn load_config() -> Result<ScreenerConfig, Error> {
    // 1. Load .env file from the working directory or its parents.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Defaults, replaced by screener.toml when present.
    let config = load_file(Path::new(CONFIG_FILE))?;

    // 3. Environment wins.
    let config = apply_env(config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;
    Ok(config)
}

fn load_file(path: &Path) -> Result<ScreenerConfig, Error> {
    if !path.exists() {
        return Ok(ScreenerConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

fn apply_env(
    mut config: ScreenerConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<ScreenerConfig, Error> {
    if let Some(url) = var("SCREENER_API_URL") {
        let trimmed = url.trim();
        if !trimmed.is_empty() {
            config.api_base_url = trimmed.to_string();
        }
    }
    if let Some(raw) = var("SCREENER_TIMEOUT_SECS") {
        config.request_timeout_secs = parse_positive_u64(&raw, "SCREENER_TIMEOUT_SECS")?;
    }
    Ok(config)
}
