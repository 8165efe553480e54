/// Server configuration, read from the environment at startup.
///
/// Provider credentials are handled separately by `AzureChat::from_env`; the
/// values here only shape the HTTP surface.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the server binds to
    pub bind_addr: String,

    /// Origin allowed to call the API from a browser
    pub allowed_origin: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("RELAY_BIND_ADDR", "0.0.0.0:8000"),
            allowed_origin: env_or("RELAY_ALLOWED_ORIGIN", "http://localhost:3000"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            allowed_origin: "http://localhost:3000".to_string(),
        }
    }
}

fn env_or(name: &str, fallback: &str) -> String {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => fallback.to_string(),
    }
}
