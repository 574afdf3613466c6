use std::env;
use std::time::Duration;

use crate::routes::guard::{DEFAULT_LANDING_PATH, DEFAULT_LOGIN_PATH};

/// AppConfig
///
/// Everything the portal needs to reach its two backends and to route users. Loaded once
/// at startup and immutable afterwards.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Selects log format and how strict loading is.
    pub env: Env,
    // Base URL of the role service (`GET {url}/users/role?email=`).
    pub role_service_url: String,
    // Optional bearer token for the role service; no auth header when unset.
    pub role_service_token: Option<String>,
    // Request timeout applied to both backends.
    pub request_timeout: Duration,
    // Root of the Identity-Toolkit compatible REST API.
    pub identity_api_url: String,
    // Web API key of the identity project.
    pub identity_api_key: String,
    // Where anonymous visitors of protected views are sent.
    pub login_path: String,
    // Where users land after login when no protected path was captured.
    pub landing_path: String,
}

/// Env
///
/// Local development vs. production deployment.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const LOCAL_ROLE_SERVICE_URL: &str = "http://localhost:3000";
const LOCAL_IDENTITY_API_URL: &str = "http://localhost:9099/identitytoolkit.googleapis.com";

impl Default for AppConfig {
    /// default
    ///
    /// Local values that never panic; used by tests and as the base of `load` in local mode.
    fn default() -> Self {
        Self {
            env: Env::Local,
            role_service_url: LOCAL_ROLE_SERVICE_URL.to_string(),
            role_service_token: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            identity_api_url: LOCAL_IDENTITY_API_URL.to_string(),
            identity_api_key: "local-dev-key".to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            landing_path: DEFAULT_LANDING_PATH.to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables (`APP_ENV`, `ROLE_SERVICE_URL`,
    /// `ROLE_SERVICE_TOKEN`, `ROLE_SERVICE_TIMEOUT_SECS`, `IDENTITY_API_URL`,
    /// `IDENTITY_API_KEY`, `LOGIN_PATH`, `LANDING_PATH`).
    ///
    /// # Panics
    /// In production, panics when `ROLE_SERVICE_URL` or `IDENTITY_API_KEY` is missing, so
    /// the portal never starts half-configured. Local mode falls back to defaults.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };
        let defaults = Self::default();

        let request_timeout = env::var("ROLE_SERVICE_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let role_service_token = env::var("ROLE_SERVICE_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        let login_path = env::var("LOGIN_PATH").unwrap_or(defaults.login_path);
        let landing_path = env::var("LANDING_PATH").unwrap_or(defaults.landing_path);

        match env {
            Env::Local => Self {
                env: Env::Local,
                role_service_url: env::var("ROLE_SERVICE_URL").unwrap_or(defaults.role_service_url),
                role_service_token,
                request_timeout,
                identity_api_url: env::var("IDENTITY_API_URL").unwrap_or(defaults.identity_api_url),
                identity_api_key: env::var("IDENTITY_API_KEY").unwrap_or(defaults.identity_api_key),
                login_path,
                landing_path,
            },
            Env::Production => Self {
                env: Env::Production,
                role_service_url: env::var("ROLE_SERVICE_URL")
                    .expect("FATAL: ROLE_SERVICE_URL required in prod"),
                role_service_token,
                request_timeout,
                identity_api_url: env::var("IDENTITY_API_URL")
                    .unwrap_or_else(|_| "https://identitytoolkit.googleapis.com".to_string()),
                identity_api_key: env::var("IDENTITY_API_KEY")
                    .expect("FATAL: IDENTITY_API_KEY required in prod"),
                login_path,
                landing_path,
            },
        }
    }
}
