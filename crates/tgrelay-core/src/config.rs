use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    auth::Credentials,
    errors::Error,
    recovery::RecoveryConfig,
    relay::RelayConfig,
    rpc::GuardConfig,
    Result,
};

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    // Application identity
    pub api_id: i32,
    pub api_hash: String,

    // Storage
    pub session_file: PathBuf,
    pub database_url: String,

    // Transport
    pub rpc_bridge_url: String,
    pub rpc_timeout: Duration,
    pub rpc_min_interval: Duration,
    pub device_model: String,
    pub system_version: String,
    pub app_version: String,
    pub lang_code: String,

    // Relay
    pub poll_interval: Duration,
    pub history_page_size: u32,
    pub dialog_limit: u32,
    pub max_forward_attempts: u32,
    /// `None` keeps prompting forever.
    pub selection_max_attempts: Option<u32>,

    // Recovery
    pub recovery_base_delay: Duration,
    pub recovery_max_delay: Duration,
    /// `None` retries forever.
    pub recovery_max_attempts: Option<u32>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let cfg = Self::from_lookup(|key| env::var(key).ok())?;

        if let Some(dir) = cfg
            .session_file
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
        {
            fs::create_dir_all(dir)?;
        }
        if let Some(dir) = sqlite_parent_dir(&cfg.database_url) {
            fs::create_dir_all(dir)?;
        }
        Ok(cfg)
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let ms = |key: &str, default: u64| -> Result<Duration> {
            Ok(Duration::from_millis(parse_or(key, get(key), default)?))
        };

        let api_id = get("TELEGRAM_API_ID")
            .ok_or_else(|| {
                Error::Config("TELEGRAM_API_ID environment variable is required".to_string())
            })?
            .parse::<i32>()
            .map_err(|_| Error::Config("TELEGRAM_API_ID must be an integer".to_string()))?;
        let api_hash = get("TELEGRAM_API_HASH").ok_or_else(|| {
            Error::Config("TELEGRAM_API_HASH environment variable is required".to_string())
        })?;

        Ok(Self {
            api_id,
            api_hash,

            session_file: get("SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/session.json")),
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://data/relay.db?mode=rwc".to_string()),

            rpc_bridge_url: get("RPC_BRIDGE_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8910".to_string()),
            rpc_timeout: ms("RPC_TIMEOUT_MS", 30_000)?,
            rpc_min_interval: ms("RPC_MIN_INTERVAL_MS", 0)?,
            device_model: get("DEVICE_MODEL").unwrap_or_else(|| "Chrome".to_string()),
            system_version: get("SYSTEM_VERSION").unwrap_or_else(|| "macOS".to_string()),
            app_version: get("APP_VERSION").unwrap_or_else(|| "1.0.0".to_string()),
            lang_code: get("LANG_CODE").unwrap_or_else(|| "en".to_string()),

            poll_interval: ms("POLL_INTERVAL_MS", 1_000)?,
            history_page_size: parse_or("HISTORY_PAGE_SIZE", get("HISTORY_PAGE_SIZE"), 100)?,
            dialog_limit: parse_or("DIALOG_LIMIT", get("DIALOG_LIMIT"), 100)?,
            max_forward_attempts: parse_or(
                "MAX_FORWARD_ATTEMPTS",
                get("MAX_FORWARD_ATTEMPTS"),
                3u32,
            )?
            .max(1),
            selection_max_attempts: zero_is_unbounded(parse_or(
                "SELECTION_MAX_ATTEMPTS",
                get("SELECTION_MAX_ATTEMPTS"),
                5,
            )?),

            recovery_base_delay: ms("RECOVERY_BASE_DELAY_MS", 5_000)?,
            recovery_max_delay: ms("RECOVERY_MAX_DELAY_MS", 300_000)?,
            recovery_max_attempts: zero_is_unbounded(parse_or(
                "RECOVERY_MAX_ATTEMPTS",
                get("RECOVERY_MAX_ATTEMPTS"),
                10,
            )?),
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
        }
    }

    pub fn recovery(&self) -> RecoveryConfig {
        RecoveryConfig {
            base_delay: self.recovery_base_delay,
            max_delay: self.recovery_max_delay.max(self.recovery_base_delay),
            max_attempts: self.recovery_max_attempts,
        }
    }

    pub fn relay(&self) -> RelayConfig {
        RelayConfig {
            poll_interval: self.poll_interval,
            page_size: self.history_page_size.max(1),
            max_forward_attempts: self.max_forward_attempts,
        }
    }

    pub fn guard(&self) -> GuardConfig {
        GuardConfig {
            min_interval: self.rpc_min_interval,
            call_timeout: self.rpc_timeout,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(v) => v
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {v}"))),
    }
}

fn zero_is_unbounded(n: u32) -> Option<u32> {
    (n > 0).then_some(n)
}

/// Directory of a file-backed `sqlite://` url, if any.
fn sqlite_parent_dir(url: &str) -> Option<&Path> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue; // existing env wins
        }

        let mut val = v.trim();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }

        env::set_var(key, val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] =
        [("TELEGRAM_API_ID", "12345"), ("TELEGRAM_API_HASH", "abc")];

    #[test]
    fn defaults_apply() {
        let cfg = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(cfg.api_id, 12345);
        assert_eq!(cfg.session_file, PathBuf::from("./data/session.json"));
        assert_eq!(cfg.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.device_model, "Chrome");
        assert_eq!(cfg.recovery(), RecoveryConfig::default());
        assert_eq!(cfg.relay(), RelayConfig::default());
        assert_eq!(cfg.selection_max_attempts, Some(5));
        assert_eq!(cfg.guard().call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn missing_credentials_are_config_errors() {
        let err = Config::from_lookup(lookup(&[("TELEGRAM_API_HASH", "abc")])).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("TELEGRAM_API_ID")));

        let vars = [("TELEGRAM_API_ID", "1"), ("TELEGRAM_API_HASH", " ")];
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("TELEGRAM_API_HASH")));

        let vars = [("TELEGRAM_API_ID", "abc"), ("TELEGRAM_API_HASH", "x")];
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_attempts_means_unbounded() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("RECOVERY_MAX_ATTEMPTS", "0"));
        vars.push(("SELECTION_MAX_ATTEMPTS", "0"));
        vars.push(("POLL_INTERVAL_MS", "250"));
        let cfg = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(cfg.recovery().max_attempts, None);
        assert_eq!(cfg.selection_max_attempts, None);
        assert_eq!(cfg.relay().poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn malformed_number_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("HISTORY_PAGE_SIZE", "lots"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("HISTORY_PAGE_SIZE")));
    }

    #[test]
    fn sqlite_dirs() {
        assert_eq!(
            sqlite_parent_dir("sqlite://data/relay.db?mode=rwc"),
            Some(Path::new("data"))
        );
        assert_eq!(sqlite_parent_dir("sqlite::memory:"), None);
        assert_eq!(sqlite_parent_dir("sqlite://relay.db"), None);
        assert_eq!(sqlite_parent_dir("postgres://x/y"), None);
    }
}
