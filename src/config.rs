use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

pub struct Config {
    pub listen: String,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub frontend_url: String,
    pub token_ttl_hours: i64,
}

impl Config {
    pub fn load() -> Self {
        let jwt_secret = match var("ROLLBOOKD_JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("ROLLBOOKD_JWT_SECRET not set, using an insecure default");
                "change_this_secret".to_string()
            }
        };
        Self {
            listen: load_or("ROLLBOOKD_LISTEN", "127.0.0.1:8080"),
            data_dir: PathBuf::from(load_or("ROLLBOOKD_DATA_DIR", "./data")),
            jwt_secret,
            frontend_url: load_or("ROLLBOOKD_FRONTEND_URL", "http://localhost:3000"),
            token_ttl_hours: load_num("ROLLBOOKD_TOKEN_TTL_HOURS", 8),
        }
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn load_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn load_num(key: &str, default: i64) -> i64 {
    match var(key) {
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value ({e}), using default: {default}");
            default
        }),
        None => default,
    }
}
