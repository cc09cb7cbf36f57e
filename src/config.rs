//! Environment-driven configuration.
//!
//! Policy constants (batch ceiling, inter-batch delay, pause timeout, resume
//! poll interval) are deliberately not configurable: they live as consts next
//! to the code that enforces them.

/// Runtime configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    /// Base URL of the remote CRM's REST webhook, with trailing slash.
    pub webhook_url: String,
    /// Target number of contacts per generation run.
    pub num_contacts: usize,
    /// Target number of companies per generation run.
    pub num_companies: usize,
}

impl AppConfig {
    /// Load configuration from the environment, with sensible defaults.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let webhook_url = std::env::var("CRM_WEBHOOK_URL")
            .unwrap_or_else(|_| "http://localhost:8080/rest/".to_string());
        let num_contacts = std::env::var("NUM_CONTACTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);
        let num_companies = std::env::var("NUM_COMPANIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        Self {
            host,
            port,
            allowed_origins,
            webhook_url,
            num_contacts,
            num_companies,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: vec!["*".to_string()],
            webhook_url: "http://localhost:8080/rest/".to_string(),
            num_contacts: 100,
            num_companies: 100,
        }
    }
}
