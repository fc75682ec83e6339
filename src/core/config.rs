use serde::{Deserialize, Serialize};

/// Connect-time configuration.
///
/// Every field is transmitted as given; empty strings pass through
/// unvalidated. `token`, `os`, `browser`, and `device` feed the Identify
/// frame; `user_agent` goes on the endpoint discovery request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub token: String,
    pub os: String,
    pub browser: String,
    pub device: String,
    pub user_agent: String,
}
