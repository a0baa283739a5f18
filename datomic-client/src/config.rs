//! Connection configuration.
//!
//! A configuration is assembled from sources in strict precedence (later
//! overrides earlier where the later value is present):
//! 1. Built-in defaults (timeout only)
//! 2. `DATOMIC_*` environment variables
//! 3. Caller-supplied arguments
//!
//! If the merged result is still incomplete, `~/.datomic/config` is merged
//! *under* it: values already present win over the home file.

use datomic_protocol::Anomaly;
use std::fmt;
use std::path::{Path, PathBuf};

/// Account id accepted for on-premises peer-server mode.
pub const PRO_ACCOUNT: &str = "00000000-0000-0000-0000-000000000000";

/// Region accepted for on-premises peer-server mode.
pub const PRO_REGION: &str = "none";

/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

const ENV_VARS: [(&str, ConfigField); 6] = [
    ("DATOMIC_ACCOUNT_ID", ConfigField::AccountId),
    ("DATOMIC_ACCESS_KEY", ConfigField::AccessKey),
    ("DATOMIC_SECRET", ConfigField::Secret),
    ("DATOMIC_ENDPOINT", ConfigField::Endpoint),
    ("DATOMIC_SERVICE", ConfigField::Service),
    ("DATOMIC_REGION", ConfigField::Region),
];

#[derive(Clone, Copy)]
enum ConfigField {
    AccountId,
    AccessKey,
    Secret,
    Endpoint,
    Service,
    Region,
}

/// Client connection configuration. Compared by value: a validated
/// configuration is the connection cache key.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ClientConfig {
    pub account_id: Option<String>,
    pub access_key: Option<String>,
    pub secret: Option<String>,
    pub endpoint: Option<String>,
    pub service: Option<String>,
    pub region: Option<String>,
    /// Per-request timeout in milliseconds.
    pub timeout: Option<u64>,
    pub db_name: Option<String>,
}

impl ClientConfig {
    pub fn new() -> ClientConfig {
        ClientConfig::default()
    }

    pub fn with_account_id(mut self, v: impl Into<String>) -> ClientConfig {
        self.account_id = Some(v.into());
        self
    }

    pub fn with_access_key(mut self, v: impl Into<String>) -> ClientConfig {
        self.access_key = Some(v.into());
        self
    }

    pub fn with_secret(mut self, v: impl Into<String>) -> ClientConfig {
        self.secret = Some(v.into());
        self
    }

    pub fn with_endpoint(mut self, v: impl Into<String>) -> ClientConfig {
        self.endpoint = Some(v.into());
        self
    }

    pub fn with_service(mut self, v: impl Into<String>) -> ClientConfig {
        self.service = Some(v.into());
        self
    }

    pub fn with_region(mut self, v: impl Into<String>) -> ClientConfig {
        self.region = Some(v.into());
        self
    }

    pub fn with_timeout(mut self, ms: u64) -> ClientConfig {
        self.timeout = Some(ms);
        self
    }

    pub fn with_db_name(mut self, v: impl Into<String>) -> ClientConfig {
        self.db_name = Some(v.into());
        self
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    /// All six credential/endpoint fields present and non-empty.
    pub fn is_valid(&self) -> bool {
        [
            &self.account_id,
            &self.access_key,
            &self.secret,
            &self.endpoint,
            &self.service,
            &self.region,
        ]
        .iter()
        .all(|f| f.as_deref().is_some_and(|s| !s.is_empty()))
    }

    fn set(&mut self, field: ConfigField, value: String) {
        let slot = match field {
            ConfigField::AccountId => &mut self.account_id,
            ConfigField::AccessKey => &mut self.access_key,
            ConfigField::Secret => &mut self.secret,
            ConfigField::Endpoint => &mut self.endpoint,
            ConfigField::Service => &mut self.service,
            ConfigField::Region => &mut self.region,
        };
        *slot = Some(value);
    }
}

// The secret never renders; the validate anomaly embeds this output.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("account_id", &self.account_id)
            .field("access_key", &self.access_key)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("service", &self.service)
            .field("region", &self.region)
            .field("timeout", &self.timeout)
            .field("db_name", &self.db_name)
            .finish()
    }
}

/// Field-wise merge: `over` wins wherever it has a value.
fn merge(base: ClientConfig, over: ClientConfig) -> ClientConfig {
    ClientConfig {
        account_id: over.account_id.or(base.account_id),
        access_key: over.access_key.or(base.access_key),
        secret: over.secret.or(base.secret),
        endpoint: over.endpoint.or(base.endpoint),
        service: over.service.or(base.service),
        region: over.region.or(base.region),
        timeout: over.timeout.or(base.timeout),
        db_name: over.db_name.or(base.db_name),
    }
}

fn from_env() -> ClientConfig {
    let mut config = ClientConfig::default();
    for (var, field) in ENV_VARS {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                config.set(field, value);
            }
        }
    }
    config
}

/// Resolves a configuration from defaults, environment and caller args,
/// consulting the home file only when the merge is still incomplete.
pub fn resolve(args: ClientConfig) -> ClientConfig {
    let defaults = ClientConfig::default().with_timeout(DEFAULT_TIMEOUT_MS);
    let merged = merge(merge(defaults, from_env()), args);
    if merged.is_valid() {
        return merged;
    }
    match home_config_path().and_then(|p| read_config_file(&p)) {
        // Existing values win over the home file.
        Some(home) => merge(home, merged),
        None => merged,
    }
}

/// Returns the configuration unchanged when complete, otherwise an
/// incorrect anomaly. No connection is built from an invalid config.
pub fn validate(config: ClientConfig) -> Result<ClientConfig, Anomaly> {
    if config.is_valid() {
        Ok(config)
    } else {
        Err(Anomaly::incorrect(format!(
            "Incomplete or invalid connection config: {config:?}"
        )))
    }
}

fn home_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".datomic").join("config"))
}

/// Reads `key = value` lines from a config file. A missing file
/// contributes nothing quietly; a malformed file is reported on stderr and
/// contributes nothing.
fn read_config_file(path: &Path) -> Option<ClientConfig> {
    let text = std::fs::read_to_string(path).ok()?;
    match parse_config_text(&text) {
        Ok(config) => Some(config),
        Err(line) => {
            eprintln!("Unable to parse {}", path.display());
            tracing::warn!(path = %path.display(), line, "unable to parse config file");
            None
        }
    }
}

fn parse_config_text(text: &str) -> Result<ClientConfig, String> {
    let mut config = ClientConfig::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("missing '=' in line {line:?}"))?;
        let key = key.trim();
        let value = value.trim().to_string();
        match key {
            "account-id" => config.account_id = Some(value),
            "access-key" => config.access_key = Some(value),
            "secret" => config.secret = Some(value),
            "endpoint" => config.endpoint = Some(value),
            "service" => config.service = Some(value),
            "region" => config.region = Some(value),
            "db-name" => config.db_name = Some(value),
            "timeout" => {
                config.timeout = Some(
                    value
                        .parse()
                        .map_err(|_| format!("bad timeout value {value:?}"))?,
                );
            }
            // unknown keys pass silently for forward compatibility
            _ => {}
        }
    }
    Ok(config)
}
