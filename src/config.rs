use std::time::Duration;

/// Runtime configuration, loaded from environment variables with sensible
/// defaults. `dotenvy` has already populated the environment by the time
/// `from_env` runs (see main.rs).
#[derive(Debug, Clone)]
pub struct Config {
    /// Run Chrome headless. HEADLESS_MODE, default true.
    pub headless: bool,
    /// Per-operation browser timeout. STEP_TIMEOUT_MS, default 30000.
    pub step_timeout: Duration,
    /// Upper bound for one whole plan execution on the server.
    /// RUN_TIMEOUT_SEC, default 120.
    pub run_timeout: Duration,
    /// If non-empty, navigate URLs must contain one of these patterns.
    /// ALLOWED_URL_PATTERNS, comma-separated, default empty (allow all).
    pub allowed_url_patterns: Vec<String>,
    /// Emit JSON-formatted logs instead of human-readable ones.
    /// LOG_FORMAT=json, default text.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            headless: true,
            step_timeout: Duration::from_millis(30_000),
            run_timeout: Duration::from_secs(120),
            allowed_url_patterns: Vec::new(),
            log_json: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            headless: env_bool("HEADLESS_MODE", defaults.headless),
            step_timeout: Duration::from_millis(env_u64(
                "STEP_TIMEOUT_MS",
                defaults.step_timeout.as_millis() as u64,
            )),
            run_timeout: Duration::from_secs(env_u64(
                "RUN_TIMEOUT_SEC",
                defaults.run_timeout.as_secs(),
            )),
            allowed_url_patterns: env_list("ALLOWED_URL_PATTERNS"),
            log_json: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.log_json),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => v.to_lowercase() == "true",
        Err(_) => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Comma-separated list; blank entries are dropped.
fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| {
            v.split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
