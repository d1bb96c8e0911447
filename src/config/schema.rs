//! Configuration schema definitions.
//!
//! The root document keeps module fragments (`storage`, `apps`, log writers
//! and encoders) as raw JSON; they are decoded by the module that claims
//! them during provisioning.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default admin endpoint.
pub const DEFAULT_ADMIN_LISTEN: &str = "localhost:2019";

/// Root configuration document.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub admin: AdminConfig,

    pub logging: LoggingConfig,

    /// `{"module": "<name>", ...}` in the `storage` namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<Value>,

    /// App name → fragment, in document order.
    pub apps: Map<String, Value>,
}

/// Admin endpoint settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdminConfig {
    pub disabled: bool,

    pub listen: String,

    /// Require `Origin` (or `Referer`) to be in `origins`.
    pub enforce_origin: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub origins: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigSettings>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteAdmin>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            listen: DEFAULT_ADMIN_LISTEN.to_string(),
            enforce_origin: false,
            origins: Vec::new(),
            config: None,
            remote: None,
        }
    }
}

impl AdminConfig {
    /// Access entries; none means every admin request is denied.
    pub fn access_control(&self) -> &[AdminAccess] {
        self.remote
            .as_ref()
            .map(|r| r.access_control.as_slice())
            .unwrap_or_default()
    }

    pub fn persist(&self) -> bool {
        self.config
            .as_ref()
            .and_then(|c| c.persist)
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigSettings {
    /// Keep the last loaded document in storage. Defaults to true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist: Option<bool>,

    /// `config_loaders` module producing the next document once this one runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<Value>,

    /// Wait before running `load`, then keep polling at this interval.
    /// Zero runs the loader once, right after the load completes.
    #[serde(with = "duration", skip_serializing_if = "Duration::is_zero")]
    pub load_delay: Duration,
}

/// Access-controlled admin endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteAdmin {
    /// Additional address serving the admin API.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub listen: String,

    pub access_control: Vec<AdminAccess>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AdminAccess {
    /// Bearer credentials accepted by this entry.
    pub public_keys: Vec<String>,

    /// No permissions means the keys may do anything.
    pub permissions: Vec<AdminPermissions>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AdminPermissions {
    /// Path prefixes. Empty = all paths.
    #[serde(alias = "path")]
    pub paths: Vec<String>,

    /// Empty = all methods.
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Receives events from outside this crate (dependencies).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkLog>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub logs: BTreeMap<String, CustomLog>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct SinkLog {
    /// `{"output": "<name>", ...}` in `logging.writers`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CustomLog {
    /// `{"output": "<name>", ...}`; stderr when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer: Option<Value>,

    /// `{"format": "<name>", ...}`; json when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder: Option<Value>,

    /// Minimum level: trace, debug, info (default), warn, error.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub level: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<LogSampling>,

    /// Event target prefixes to keep. Empty = all.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    /// Event target prefixes to drop.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct LogSampling {
    #[serde(with = "duration")]
    pub interval: Duration,
    pub first: u64,
    pub thereafter: u64,
}

/// Durations as integer nanoseconds or strings like `"1.5s"`, `"250ms"`, `"1m30s"`.
pub mod duration {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Nanos(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_nanos().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Nanos(n) => Ok(Duration::from_nanos(n)),
            Raw::Text(s) => parse(&s).map_err(D::Error::custom),
        }
    }

    pub fn parse(input: &str) -> Result<Duration, String> {
        let input = input.trim();
        if input.is_empty() {
            return Err("empty duration".to_string());
        }

        let mut total = 0f64;
        let mut rest = input;
        while !rest.is_empty() {
            let number_len = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .ok_or_else(|| format!("missing unit in duration {:?}", input))?;
            if number_len == 0 {
                return Err(format!("invalid duration {:?}", input));
            }
            let value: f64 = rest[..number_len]
                .parse()
                .map_err(|_| format!("invalid duration {:?}", input))?;
            rest = &rest[number_len..];

            let unit_len = rest
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(rest.len());
            let seconds = match &rest[..unit_len] {
                "ns" => 1e-9,
                "us" | "µs" => 1e-6,
                "ms" => 1e-3,
                "s" => 1.0,
                "m" => 60.0,
                "h" => 3600.0,
                "d" => 86400.0,
                other => return Err(format!("unknown unit {:?} in duration {:?}", other, input)),
            };
            total += value * seconds;
            rest = &rest[unit_len..];
        }
        if !total.is_finite() {
            return Err(format!("duration {:?} out of range", input));
        }
        Duration::try_from_secs_f64(total)
            .map_err(|e| format!("duration {:?} out of range: {}", input, e))
    }
}
