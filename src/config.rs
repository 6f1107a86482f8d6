//! Optional config file loading. Search order: ./lbcscan.toml, then
//! $XDG_CONFIG_HOME/lbcscan/config.toml (or ~/.config/lbcscan/config.toml).
//!
//! The API key may also come from the `PILOTERR_API_KEY` environment variable.

use serde::Deserialize;
use std::path::PathBuf;

pub const API_KEY_ENV: &str = "PILOTERR_API_KEY";

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Scraping API key, sent as `x-api-key`.
    pub api_key: Option<String>,
    /// API root, e.g. https://piloterr.com/api/v2.
    pub base_url: Option<String>,
    /// Marketplace root the category scan searches on.
    pub site_url: Option<String>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Minimum delay in seconds between requests.
    pub request_delay_secs: Option<u64>,
    /// Consecutive failed pages that end a category scan.
    pub max_jump: Option<u32>,
    /// Highest category ID to scan.
    pub max_cat: Option<u32>,
    /// Default output directory when -o is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
}

/// Search order: (1) ./lbcscan.toml, (2) $XDG_CONFIG_HOME/lbcscan/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("lbcscan.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("lbcscan").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "Loaded config");
            return Ok(Some(config));
        }
    }
    Ok(None)
}

/// Pick the API key: explicit flag, then environment value, then config file.
/// Blank values are skipped.
pub fn resolve_api_key(
    flag: Option<&str>,
    env: Option<&str>,
    config: Option<&Config>,
) -> Option<String> {
    [flag, env, config.and_then(|c| c.api_key.as_deref())]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|k| !k.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.api_key.is_none());
        assert!(c.base_url.is_none());
        assert!(c.site_url.is_none());
        assert!(c.user_agent.is_none());
        assert!(c.timeout_secs.is_none());
        assert!(c.request_delay_secs.is_none());
        assert!(c.max_jump.is_none());
        assert!(c.max_cat.is_none());
        assert!(c.output_dir.is_none());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            api_key = "abc123"
            base_url = "https://piloterr.com/api/v2"
            site_url = "https://www.leboncoin.fr"
            user_agent = "Custom/1.0"
            timeout_secs = 60
            request_delay_secs = 1
            max_jump = 3
            max_cat = 200
            output_dir = "output"
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(c.api_key.as_deref(), Some("abc123"));
        assert_eq!(c.base_url.as_deref(), Some("https://piloterr.com/api/v2"));
        assert_eq!(c.site_url.as_deref(), Some("https://www.leboncoin.fr"));
        assert_eq!(c.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(c.timeout_secs, Some(60));
        assert_eq!(c.request_delay_secs, Some(1));
        assert_eq!(c.max_jump, Some(3));
        assert_eq!(c.max_cat, Some(200));
        assert_eq!(c.output_dir.as_deref(), Some(std::path::Path::new("output")));
    }

    #[test]
    fn parse_partial_config() {
        let c: Config = toml::from_str("max_cat = 50").unwrap();
        assert_eq!(c.max_cat, Some(50));
        assert!(c.max_jump.is_none());
        assert!(c.api_key.is_none());
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("max_cat = [").is_err());
        assert!(toml::from_str::<Config>("max_cat = \"many\"").is_err());
    }

    #[test]
    fn api_key_precedence() {
        let c = Config {
            api_key: Some("from-config".into()),
            ..Config::default()
        };
        assert_eq!(
            resolve_api_key(Some("flag"), Some("env"), Some(&c)).as_deref(),
            Some("flag")
        );
        assert_eq!(
            resolve_api_key(None, Some("env"), Some(&c)).as_deref(),
            Some("env")
        );
        assert_eq!(
            resolve_api_key(Some("  "), Some(""), Some(&c)).as_deref(),
            Some("from-config")
        );
        assert_eq!(resolve_api_key(None, None, None), None);
    }
}
