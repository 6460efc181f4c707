//! Configuration resolution — defaults, then `config.json`, then environment.
//!
//! Resolved once at startup into an immutable [`Config`] that is passed by
//! reference to every component. Environment variables always win when
//! present, even when empty. Numeric settings stay as raw strings and are
//! parsed at the moment they are used, so a bad `DELAY` only faults when
//! the loop first tries to wait.

use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HubStatsError, Result};

pub const CONFIG_FILE_NAME: &str = "config.json";

pub const INFLUXDB_V2_URL: &str = "INFLUXDB_V2_URL";
pub const INFLUXDB_V2_TOKEN: &str = "INFLUXDB_V2_TOKEN";
pub const INFLUXDB_V2_ORG: &str = "INFLUXDB_V2_ORG";
pub const DELAY: &str = "DELAY";
pub const INFLUXDB_BUCKET: &str = "INFLUXDB_BUCKET";
pub const DOCKERHUB_IMAGES: &str = "DOCKERHUB_IMAGES";
pub const DOCKERHUB_USERS: &str = "DOCKERHUB_USERS";
pub const DOCKERHUB_API_URL: &str = "DOCKERHUB_API_URL";
pub const FETCH_RETRIES: &str = "FETCH_RETRIES";

/// Every setting name recognized in the config file and the environment.
pub const RECOGNIZED_KEYS: [&str; 9] = [
    INFLUXDB_V2_URL,
    INFLUXDB_V2_TOKEN,
    INFLUXDB_V2_ORG,
    DELAY,
    INFLUXDB_BUCKET,
    DOCKERHUB_IMAGES,
    DOCKERHUB_USERS,
    DOCKERHUB_API_URL,
    FETCH_RETRIES,
];

const LIST_DELIMITER: char = ',';

/// Fully resolved service configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub influx_url: String,
    pub influx_token: String,
    pub influx_org: String,
    /// Seconds between poll cycles, unparsed.
    pub delay: String,
    pub bucket: String,
    pub images: Vec<String>,
    pub users: Vec<String>,
    pub registry_url: String,
    /// Per-entity retry attempts, unparsed. `0` keeps crash-and-restart.
    pub fetch_retries: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            influx_url: "10.0.0.10:8087".into(),
            influx_token: String::new(),
            influx_org: "my-org".into(),
            delay: "60".into(),
            bucket: "dockerhub/autogen".into(),
            images: Vec::new(),
            users: Vec::new(),
            registry_url: crate::registry::dockerhub::DEFAULT_API_URL.into(),
            fetch_retries: "0".into(),
        }
    }
}

// Token stays out of logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("influx_url", &self.influx_url)
            .field("influx_token", &"<redacted>")
            .field("influx_org", &self.influx_org)
            .field("delay", &self.delay)
            .field("bucket", &self.bucket)
            .field("images", &self.images)
            .field("users", &self.users)
            .field("registry_url", &self.registry_url)
            .field("fetch_retries", &self.fetch_retries)
            .finish()
    }
}

impl Config {
    /// Resolve from `config.json` beside the executable and the process environment.
    pub fn resolve() -> Result<Self> {
        let path = config_file_path()?;
        Self::resolve_with(Some(path.as_path()), |key| {
            std::env::var_os(key).map(|v| v.to_string_lossy().into_owned())
        })
    }

    /// Resolve with an explicit file location and environment lookup.
    ///
    /// A `file` that does not exist is skipped silently; one that exists but
    /// is not a JSON object is a config fault.
    pub fn resolve_with<F>(file: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut layered = Self::default().to_layer();

        if let Some(path) = file.filter(|p| p.exists()) {
            for (key, value) in read_config_file(path)? {
                if RECOGNIZED_KEYS.contains(&key.as_str()) {
                    layered.insert(key, value);
                } else {
                    tracing::debug!(key = %key, path = %path.display(), "Ignoring unrecognized config key");
                }
            }
        }

        for key in RECOGNIZED_KEYS {
            if let Some(value) = env(key) {
                layered.insert(key.to_string(), Value::String(value));
            }
        }

        Self::from_layer(&layered)
    }

    /// Poll delay, parsed now. Non-numeric values fault here, not at startup.
    pub fn delay(&self) -> Result<Duration> {
        self.delay
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| HubStatsError::Config(format!("{DELAY}={:?} is not a number of seconds: {e}", self.delay)))
    }

    pub fn retry_attempts(&self) -> Result<u32> {
        self.fetch_retries
            .trim()
            .parse::<u32>()
            .map_err(|e| HubStatsError::Config(format!("{FETCH_RETRIES}={:?} is not a count: {e}", self.fetch_retries)))
    }

    fn to_layer(&self) -> Map<String, Value> {
        let list = |items: &[String]| Value::Array(items.iter().cloned().map(Value::String).collect());
        let mut map = Map::new();
        map.insert(INFLUXDB_V2_URL.into(), Value::String(self.influx_url.clone()));
        map.insert(INFLUXDB_V2_TOKEN.into(), Value::String(self.influx_token.clone()));
        map.insert(INFLUXDB_V2_ORG.into(), Value::String(self.influx_org.clone()));
        map.insert(DELAY.into(), Value::String(self.delay.clone()));
        map.insert(INFLUXDB_BUCKET.into(), Value::String(self.bucket.clone()));
        map.insert(DOCKERHUB_IMAGES.into(), list(&self.images));
        map.insert(DOCKERHUB_USERS.into(), list(&self.users));
        map.insert(DOCKERHUB_API_URL.into(), Value::String(self.registry_url.clone()));
        map.insert(FETCH_RETRIES.into(), Value::String(self.fetch_retries.clone()));
        map
    }

    fn from_layer(map: &Map<String, Value>) -> Result<Self> {
        let scalar = |key: &str| -> Result<String> {
            map.get(key).map(|v| scalar_to_string(key, v)).unwrap_or_else(|| Ok(String::new()))
        };
        let list = |key: &str| -> Result<Vec<String>> {
            map.get(key).map(|v| normalize_list(key, v)).unwrap_or_else(|| Ok(Vec::new()))
        };

        Ok(Self {
            influx_url: scalar(INFLUXDB_V2_URL)?,
            influx_token: scalar(INFLUXDB_V2_TOKEN)?,
            influx_org: scalar(INFLUXDB_V2_ORG)?,
            delay: scalar(DELAY)?,
            bucket: scalar(INFLUXDB_BUCKET)?,
            images: list(DOCKERHUB_IMAGES)?,
            users: list(DOCKERHUB_USERS)?,
            registry_url: scalar(DOCKERHUB_API_URL)?,
            fetch_retries: scalar(FETCH_RETRIES)?,
        })
    }
}

/// `config.json` in the directory holding the running executable.
pub fn config_file_path() -> Result<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|e| HubStatsError::Config(format!("cannot locate executable: {e}")))?;
    let exe = exe.canonicalize().unwrap_or(exe);
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(CONFIG_FILE_NAME))
}

fn read_config_file(path: &Path) -> Result<Map<String, Value>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| HubStatsError::Config(format!("read {} failed: {e}", path.display())))?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(HubStatsError::Config(format!(
            "{} must contain a JSON object, found {}",
            path.display(),
            json_type_name(&other)
        ))),
        Err(e) => Err(HubStatsError::Config(format!("invalid JSON in {}: {e}", path.display()))),
    }
}

/// Normalize a list-typed setting into an ordered sequence of strings.
///
/// Arrays keep their order; a scalar containing `,` is split left to right;
/// any other scalar becomes a single entry.
///
/// Stricter than a bare split: entries are trimmed and empty ones dropped,
/// so `"a, b"` gives `["a", "b"]` (not `" b"`) and `""` gives `[]` rather
/// than `[""]`, which would otherwise request the registry root.
pub fn normalize_list(key: &str, value: &Value) -> Result<Vec<String>> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| scalar_to_string(key, item))
            .collect::<Result<_>>()?,
        other => {
            let s = scalar_to_string(key, other)?;
            if s.contains(LIST_DELIMITER) {
                s.split(LIST_DELIMITER).map(str::to_string).collect()
            } else {
                vec![s]
            }
        }
    };

    Ok(raw
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

fn scalar_to_string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(HubStatsError::Config(format!(
            "{key} must be a scalar, found {}",
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_file(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_when_nothing_supplied() {
        let cfg = Config::resolve_with(None, env_of(&[])).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.influx_org, "my-org");
        assert_eq!(cfg.bucket, "dockerhub/autogen");
        assert!(cfg.images.is_empty());
        assert!(cfg.users.is_empty());
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let cfg = Config::resolve_with(Some(path.as_path()), env_of(&[])).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            r#"{"INFLUXDB_V2_URL": "http://influx:8086", "DELAY": 15,
                "DOCKERHUB_USERS": ["alice", "bob"], "DOCKERHUB_IMAGES": "carol/tool"}"#,
        );
        let cfg = Config::resolve_with(Some(path.as_path()), env_of(&[])).unwrap();
        assert_eq!(cfg.influx_url, "http://influx:8086");
        assert_eq!(cfg.delay, "15");
        assert_eq!(cfg.users, vec!["alice", "bob"]);
        assert_eq!(cfg.images, vec!["carol/tool"]);
        // untouched keys keep defaults
        assert_eq!(cfg.influx_org, "my-org");
    }

    #[test]
    fn test_env_overrides_file_for_every_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            r#"{"INFLUXDB_V2_URL": "file-url", "INFLUXDB_V2_TOKEN": "file-token",
                "INFLUXDB_V2_ORG": "file-org", "DELAY": "10", "INFLUXDB_BUCKET": "file-bucket",
                "DOCKERHUB_IMAGES": ["f/img"], "DOCKERHUB_USERS": ["fuser"],
                "DOCKERHUB_API_URL": "file-api", "FETCH_RETRIES": "1"}"#,
        );
        let cfg = Config::resolve_with(
            Some(path.as_path()),
            env_of(&[
                (INFLUXDB_V2_URL, "env-url"),
                (INFLUXDB_V2_TOKEN, "env-token"),
                (INFLUXDB_V2_ORG, "env-org"),
                (DELAY, "30"),
                (INFLUXDB_BUCKET, "env-bucket"),
                (DOCKERHUB_IMAGES, "e/img"),
                (DOCKERHUB_USERS, "euser"),
                (DOCKERHUB_API_URL, "env-api"),
                (FETCH_RETRIES, "3"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.influx_url, "env-url");
        assert_eq!(cfg.influx_token, "env-token");
        assert_eq!(cfg.influx_org, "env-org");
        assert_eq!(cfg.delay, "30");
        assert_eq!(cfg.bucket, "env-bucket");
        assert_eq!(cfg.images, vec!["e/img"]);
        assert_eq!(cfg.users, vec!["euser"]);
        assert_eq!(cfg.registry_url, "env-api");
        assert_eq!(cfg.fetch_retries, "3");
    }

    #[test]
    fn test_empty_env_still_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            r#"{"INFLUXDB_V2_URL": "file-url", "INFLUXDB_V2_TOKEN": "file-token",
                "INFLUXDB_V2_ORG": "file-org", "DELAY": "10", "INFLUXDB_BUCKET": "file-bucket",
                "DOCKERHUB_IMAGES": ["f/img"], "DOCKERHUB_USERS": ["alice"],
                "DOCKERHUB_API_URL": "file-api", "FETCH_RETRIES": "1"}"#,
        );
        let empty: Vec<(&str, &str)> = RECOGNIZED_KEYS.iter().map(|k| (*k, "")).collect();
        let cfg = Config::resolve_with(Some(path.as_path()), env_of(&empty)).unwrap();

        assert_eq!(cfg.influx_url, "");
        assert_eq!(cfg.influx_token, "");
        assert_eq!(cfg.influx_org, "");
        assert_eq!(cfg.delay, "");
        assert_eq!(cfg.bucket, "");
        assert!(cfg.images.is_empty());
        assert!(cfg.users.is_empty());
        assert_eq!(cfg.registry_url, "");
        assert_eq!(cfg.fetch_retries, "");

        // empty numeric settings resolve fine and only fault when used
        assert_eq!(cfg.delay().unwrap_err().kind(), "config");
        assert_eq!(cfg.retry_attempts().unwrap_err().kind(), "config");
    }

    #[test]
    fn test_unset_env_keeps_file_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, r#"{"INFLUXDB_BUCKET": "stats"}"#);
        let cfg = Config::resolve_with(Some(path.as_path()), env_of(&[(DELAY, "5")])).unwrap();
        assert_eq!(cfg.bucket, "stats");
        assert_eq!(cfg.delay, "5");
    }

    #[test]
    fn test_malformed_file_is_config_fault() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "{not json");
        let err = Config::resolve_with(Some(path.as_path()), env_of(&[])).unwrap_err();
        assert_eq!(err.kind(), "config");

        let path = write_file(&dir, "[1, 2]");
        let err = Config::resolve_with(Some(path.as_path()), env_of(&[])).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn test_normalize_list_shapes() {
        assert!(normalize_list("K", &json!([])).unwrap().is_empty());
        assert!(normalize_list("K", &json!("")).unwrap().is_empty());
        assert_eq!(normalize_list("K", &json!("alice")).unwrap(), vec!["alice"]);
        assert_eq!(
            normalize_list("K", &json!("c/one,a/two,b/three")).unwrap(),
            vec!["c/one", "a/two", "b/three"]
        );
        assert_eq!(
            normalize_list("K", &json!(["z", "y", "x"])).unwrap(),
            vec!["z", "y", "x"]
        );
        assert_eq!(normalize_list("K", &json!(" a , b ,")).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_normalize_list_rejects_nested() {
        assert!(normalize_list("K", &json!([["a"]])).is_err());
        assert!(normalize_list("K", &json!({"a": 1})).is_err());
    }

    #[test]
    fn test_delay_parsed_at_use() {
        let cfg = Config::resolve_with(None, env_of(&[(DELAY, "soon")])).unwrap();
        assert_eq!(cfg.delay, "soon");
        assert_eq!(cfg.delay().unwrap_err().kind(), "config");

        let cfg = Config::resolve_with(None, env_of(&[(DELAY, "30")])).unwrap();
        assert_eq!(cfg.delay().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_attempts() {
        assert_eq!(Config::default().retry_attempts().unwrap(), 0);
        let cfg = Config::resolve_with(None, env_of(&[(FETCH_RETRIES, "x")])).unwrap();
        assert!(cfg.retry_attempts().is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let cfg = Config::resolve_with(None, env_of(&[(INFLUXDB_V2_TOKEN, "s3cr3t")])).unwrap();
        let printed = format!("{:?}", cfg);
        assert!(!printed.contains("s3cr3t"));
        assert!(printed.contains("<redacted>"));
    }
}
