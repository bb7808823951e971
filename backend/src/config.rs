use anyhow::{Context, Result};

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// `None` means any origin is allowed
    pub cors_origin: Option<String>,
    /// Expose internal error details in 500 responses
    pub debug: bool,
    pub static_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("invalid PORT value: {raw}"))?,
            Err(_) => 3000,
        };

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:gestiones.db".to_string());

        let cors_origin = std::env::var("CORS_ORIGIN")
            .ok()
            .filter(|v| !v.trim().is_empty() && v.trim() != "*");

        let debug = std::env::var("APP_DEBUG")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "public".to_string());

        Ok(Self {
            port,
            database_url,
            cors_origin,
            debug,
            static_dir,
        })
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim(), "1" | "true")
}
