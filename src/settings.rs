//! Process settings, read once from the environment at startup and passed down through state.

use crate::error::ConfigError;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogRotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minutely" => Ok(LogRotation::Minutely),
            "hourly" => Ok(LogRotation::Hourly),
            "daily" | "midnight" => Ok(LogRotation::Daily),
            "never" | "none" => Ok(LogRotation::Never),
            other => Err(format!("unknown rotation '{}'", other)),
        }
    }
}

/// File logging destination. Console logging is always on.
#[derive(Clone, Debug, PartialEq)]
pub struct LogSettings {
    pub enabled: bool,
    pub location: PathBuf,
    pub filename: String,
    pub rotation: LogRotation,
    /// Rotated files kept; 0 keeps all.
    pub backup_count: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            enabled: false,
            location: PathBuf::from("logs"),
            filename: "graph-rest.log".into(),
            rotation: LogRotation::Daily,
            backup_count: 7,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub ip_address: IpAddr,
    pub port: u16,
    pub debug: bool,
    /// `memory://` for the in-process graph, `postgres://...` for PostgreSQL.
    pub db_url: String,
    pub secret_key: Option<String>,
    /// Default page size for index requests.
    pub query_limit: u64,
    pub enable_delete_all: bool,
    pub storage_timeout: Duration,
    pub max_body_bytes: usize,
    pub graph_schema: String,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            ip_address: IpAddr::from([0, 0, 0, 0]),
            port: 5000,
            debug: false,
            db_url: "memory://".into(),
            secret_key: None,
            query_limit: 20,
            enable_delete_all: false,
            storage_timeout: Duration::from_millis(30_000),
            max_body_bytes: 1024 * 1024,
            graph_schema: "graph".into(),
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Load `.env` (if any) then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut s = Settings::default();

        if let Some(v) = get("IP_ADDRESS") {
            s.ip_address = parse("IP_ADDRESS", &v)?;
        }
        if let Some(v) = get("PORT") {
            s.port = parse("PORT", &v)?;
        }
        if let Some(v) = get("DEBUG") {
            s.debug = parse_bool("DEBUG", &v)?;
        }
        if let Some(v) = get("DB_URL") {
            s.db_url = v;
        }
        s.secret_key = get("SECRET_KEY");
        if let Some(v) = get("QUERY_LIMIT") {
            let limit: u64 = parse("QUERY_LIMIT", &v)?;
            if !(1..=100).contains(&limit) {
                return Err(ConfigError::Invalid {
                    key: "QUERY_LIMIT",
                    reason: "must be between 1 and 100".into(),
                });
            }
            s.query_limit = limit;
        }
        if let Some(v) = get("ENABLE_DELETE_ALL") {
            s.enable_delete_all = parse_bool("ENABLE_DELETE_ALL", &v)?;
        }
        if let Some(v) = get("STORAGE_TIMEOUT_MS") {
            let ms: u64 = parse("STORAGE_TIMEOUT_MS", &v)?;
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    key: "STORAGE_TIMEOUT_MS",
                    reason: "must be positive".into(),
                });
            }
            s.storage_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = get("MAX_BODY_BYTES") {
            s.max_body_bytes = parse("MAX_BODY_BYTES", &v)?;
        }
        if let Some(v) = get("GRAPH_SCHEMA") {
            s.graph_schema = v;
        }

        if let Some(v) = get("LOG_ENABLED") {
            s.log.enabled = parse_bool("LOG_ENABLED", &v)?;
        }
        if let Some(v) = get("LOG_LOCATION") {
            s.log.location = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_FILENAME") {
            s.log.filename = v;
        }
        if let Some(v) = get("LOG_ROTATION") {
            s.log.rotation = v
                .parse()
                .map_err(|reason| ConfigError::Invalid { key: "LOG_ROTATION", reason })?;
        }
        if let Some(v) = get("LOG_BACKUP_COUNT") {
            s.log.backup_count = parse("LOG_BACKUP_COUNT", &v)?;
        }
        Ok(s)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip_address, self.port)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.db_url.starts_with("memory:")
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            reason: format!("'{}' is not a boolean", raw),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.listen_addr().to_string(), "0.0.0.0:5000");
        assert!(s.uses_memory_store());
    }

    #[test]
    fn reads_overrides() {
        let s = Settings::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("DEBUG", "true"),
            ("DB_URL", "postgres://localhost/graphs"),
            ("QUERY_LIMIT", "50"),
            ("ENABLE_DELETE_ALL", "1"),
            ("LOG_ROTATION", "hourly"),
            ("SECRET_KEY", " "),
        ]))
        .unwrap();
        assert_eq!(s.port, 8080);
        assert!(s.debug);
        assert!(!s.uses_memory_store());
        assert_eq!(s.query_limit, 50);
        assert!(s.enable_delete_all);
        assert_eq!(s.log.rotation, LogRotation::Hourly);
        assert_eq!(s.secret_key, None);
    }

    #[test]
    fn rejects_bad_values() {
        let err = Settings::from_lookup(lookup(&[("QUERY_LIMIT", "500")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "QUERY_LIMIT", .. }));
        assert!(Settings::from_lookup(lookup(&[("PORT", "http")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("DEBUG", "maybe")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("LOG_ROTATION", "weekly")])).is_err());
    }
}
