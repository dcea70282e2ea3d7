use std::env;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    // Optional CLI credentials
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            email: None,
            password: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            api_url: env::var("BUSSTOP_API_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_API_URL.into()),
            request_timeout_secs: env::var("BUSSTOP_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".into())
                .parse()?,
            connect_timeout_secs: env::var("BUSSTOP_CONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            email: env::var("BUSSTOP_EMAIL").ok().filter(|s| !s.is_empty()),
            password: env::var("BUSSTOP_PASSWORD").ok().filter(|s| !s.is_empty()),
        })
    }

    /// Config pointing at an arbitrary base URL with default timeouts.
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
