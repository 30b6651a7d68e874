//! Terminal connection settings.
//!
//! Settings are resolved once at startup and handed to the connection
//! manager. Every field has a default, so an empty environment yields a
//! usable (if unpaired) configuration. Sources are layered with `figment`:
//! defaults, then an optional JSON document, then `PAYTERM_*` variables.
//!
//! # Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `PAYTERM_TERMINAL_IP` | `device_address` |
//! | `PAYTERM_CONNECTION_TYPE` | `connection_type` |
//! | `PAYTERM_CURRENCY` | `default_currency` |
//! | `PAYTERM_LOGIN_USERNAME` | `login_username` |
//! | `PAYTERM_SERVER_PORT` | `server_port` |
//! | `PAYTERM_PRIMARY_TIMEOUT_MS` | `primary_timeout_ms` |
//! | `PAYTERM_FALLBACK_TIMEOUT_MS` | `fallback_timeout_ms` |
//! | `PAYTERM_SERVER_TIMEOUT_MS` | `server_timeout_ms` |
//! | `PAYTERM_LOGIN_FAILURE_THRESHOLD` | `login_failure_threshold` |
//!
//! # Examples
//!
//! ```
//! use payterm_core::{ConnectionType, TerminalSettings};
//!
//! let settings = TerminalSettings::from_json(r#"{"device_address":"10.0.0.42"}"#).unwrap();
//!
//! assert_eq!(settings.device_address, "10.0.0.42");
//! assert_eq!(settings.connection_type, ConnectionType::Tcpip);
//! ```

use crate::constants::{
    DEFAULT_FALLBACK_TIMEOUT_MS, DEFAULT_LOGIN_USERNAME,
    DEFAULT_PRIMARY_TIMEOUT_MS, DEFAULT_SERVER_PORT, DEFAULT_SERVER_TIMEOUT_MS,
    LOGIN_FAILURE_THRESHOLD,
};
use crate::{CurrencyCode, Result, error::Error};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Prefix shared by every settings variable.
pub const ENV_PREFIX: &str = "PAYTERM_";

/// Transport used by the driver to reach the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
#[non_exhaustive]
pub enum ConnectionType {
    /// The driver dials the terminal over TCP/IP.
    #[default]
    Tcpip,

    /// The driver listens and the terminal connects to it.
    Server,

    /// Serial or USB-serial link.
    Serial,
}

impl ConnectionType {
    /// Value understood by the vendor driver.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcpip => "tcpip",
            Self::Server => "server",
            Self::Serial => "serial",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConnectionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcpip" | "tcp" => Ok(Self::Tcpip),
            "server" => Ok(Self::Server),
            "serial" => Ok(Self::Serial),
            other => Err(Error::UnknownConnectionType(other.to_string())),
        }
    }
}

impl TryFrom<String> for ConnectionType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Settings for reaching and driving the payment terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Terminal network address. Empty means "let the driver decide".
    pub device_address: String,

    /// Transport used by the primary initialization path.
    pub connection_type: ConnectionType,

    /// Currency applied when a payment does not name one.
    pub default_currency: CurrencyCode,

    /// Username presented to the terminal on login.
    pub login_username: String,

    /// Listen port for server-mode initialization.
    pub server_port: u16,

    /// Wait bound for the full pairing strategy.
    pub primary_timeout_ms: u64,

    /// Wait bound for the minimal fallback strategy.
    pub fallback_timeout_ms: u64,

    /// Wait bound for server-mode initialization.
    pub server_timeout_ms: u64,

    /// Pairing logins failing with a code strictly above this still mark the terminal ready.
    pub login_failure_threshold: i32,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            device_address: String::new(),
            connection_type: ConnectionType::default(),
            default_currency: CurrencyCode::default(),
            login_username: DEFAULT_LOGIN_USERNAME.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            primary_timeout_ms: DEFAULT_PRIMARY_TIMEOUT_MS,
            fallback_timeout_ms: DEFAULT_FALLBACK_TIMEOUT_MS,
            server_timeout_ms: DEFAULT_SERVER_TIMEOUT_MS,
            login_failure_threshold: LOGIN_FAILURE_THRESHOLD,
        }
    }
}

impl TerminalSettings {
    /// Resolve settings from the process environment.
    ///
    /// # Errors
    /// Returns `Error::Config` if a variable cannot be parsed or the result
    /// fails validation.
    pub fn from_env() -> Result<Self> {
        Self::extract(Self::figment())
    }

    /// Resolve settings from a JSON file overlaid by the environment.
    ///
    /// A missing file is skipped.
    ///
    /// # Errors
    /// Returns `Error::Config` if a source is malformed or the result fails
    /// validation.
    pub fn load(json_file: &Path) -> Result<Self> {
        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Json::file(json_file))
                .merge(env_provider()),
        )
    }

    /// Load settings from a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `Error::Config` if the document is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Json::string(json)),
        )
    }

    /// Defaults overlaid by the environment, for callers adding their own
    /// providers.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(env_provider())
    }

    /// Extract and validate settings from a prepared figment.
    ///
    /// # Errors
    /// Returns `Error::Config` if extraction or validation fails.
    pub fn extract(figment: Figment) -> Result<Self> {
        let mut settings: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        settings.device_address = settings.device_address.trim().to_string();
        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns `Error::Config` if a timeout is zero or the username is blank.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("primary_timeout_ms", self.primary_timeout_ms),
            ("fallback_timeout_ms", self.fallback_timeout_ms),
            ("server_timeout_ms", self.server_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.login_username.trim().is_empty() {
            return Err(Error::Config("login_username must not be blank".to_string()));
        }
        Ok(())
    }

    pub fn primary_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_timeout_ms)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_millis(self.server_timeout_ms)
    }

    /// Override all initialization wait bounds at once.
    pub fn with_timeouts(mut self, primary: Duration, fallback: Duration, server: Duration) -> Self {
        self.primary_timeout_ms = duration_to_ms(primary);
        self.fallback_timeout_ms = duration_to_ms(fallback);
        self.server_timeout_ms = duration_to_ms(server);
        self
    }

    pub fn with_device_address(mut self, address: impl Into<String>) -> Self {
        self.device_address = address.into();
        self
    }
}

/// `PAYTERM_*` variables keyed by field name. The two variables whose
/// names differ from their fields are renamed here; the command line's own
/// file locations are skipped.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).ignore(&["env_file", "config_file"]).map(|key| {
        let name = key.as_str();
        if name.eq_ignore_ascii_case("terminal_ip") {
            "device_address".into()
        } else if name.eq_ignore_ascii_case("currency") {
            "default_currency".into()
        } else {
            name.into()
        }
    })
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let settings = TerminalSettings::default();
        assert_eq!(settings.connection_type, ConnectionType::Tcpip);
        assert_eq!(settings.default_currency.as_str(), "DKK");
        assert_eq!(settings.primary_timeout(), Duration::from_secs(30));
        assert_eq!(settings.fallback_timeout(), Duration::from_secs(20));
        assert_eq!(settings.server_port, 8085);
        assert_eq!(settings.login_failure_threshold, -100);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_environment_yields_defaults() {
        Jail::expect_with(|_jail| {
            assert_eq!(TerminalSettings::from_env().unwrap(), TerminalSettings::default());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides() {
        Jail::expect_with(|jail| {
            jail.set_env("PAYTERM_TERMINAL_IP", "192.168.1.20");
            jail.set_env("PAYTERM_CONNECTION_TYPE", "SERVER");
            jail.set_env("PAYTERM_CURRENCY", "eur");
            jail.set_env("PAYTERM_PRIMARY_TIMEOUT_MS", "1500");
            jail.set_env("PAYTERM_LOGIN_FAILURE_THRESHOLD", "-50");

            let settings = TerminalSettings::from_env().unwrap();
            assert_eq!(settings.device_address, "192.168.1.20");
            assert_eq!(settings.connection_type, ConnectionType::Server);
            assert_eq!(settings.default_currency.as_str(), "EUR");
            assert_eq!(settings.primary_timeout_ms, 1500);
            assert_eq!(settings.login_failure_threshold, -50);
            assert_eq!(settings.fallback_timeout_ms, DEFAULT_FALLBACK_TIMEOUT_MS);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_json_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "terminal.json",
                r#"{"device_address":"10.1.1.1","server_port":9000,"login_username":"clerk"}"#,
            )?;
            jail.set_env("PAYTERM_TERMINAL_IP", "10.2.2.2");

            let settings = TerminalSettings::load(Path::new("terminal.json")).unwrap();
            assert_eq!(settings.device_address, "10.2.2.2");
            assert_eq!(settings.server_port, 9000);
            assert_eq!(settings.login_username, "clerk");
            Ok(())
        });
    }

    #[test]
    fn test_missing_json_file_is_skipped() {
        Jail::expect_with(|_jail| {
            let settings = TerminalSettings::load(Path::new("absent.json")).unwrap();
            assert_eq!(settings, TerminalSettings::default());
            Ok(())
        });
    }

    #[rstest]
    #[case("PAYTERM_SERVER_PORT", "70000")]
    #[case("PAYTERM_PRIMARY_TIMEOUT_MS", "soon")]
    #[case("PAYTERM_LOGIN_FAILURE_THRESHOLD", "-x")]
    #[case("PAYTERM_CONNECTION_TYPE", "carrier-pigeon")]
    #[case("PAYTERM_CURRENCY", "EURO")]
    #[case("PAYTERM_FALLBACK_TIMEOUT_MS", "0")]
    fn test_invalid_env_values_rejected(#[case] key: &str, #[case] value: &str) {
        Jail::expect_with(|jail| {
            jail.set_env(key, value);
            let result = TerminalSettings::from_env();
            assert!(matches!(result, Err(Error::Config(_))), "{key}={value}: {result:?}");
            Ok(())
        });
    }

    #[rstest]
    #[case("tcpip", ConnectionType::Tcpip)]
    #[case("tcp", ConnectionType::Tcpip)]
    #[case("Server", ConnectionType::Server)]
    #[case("serial", ConnectionType::Serial)]
    fn test_connection_type_parse(#[case] input: &str, #[case] expected: ConnectionType) {
        assert_eq!(input.parse::<ConnectionType>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_connection_type() {
        let result = "carrier-pigeon".parse::<ConnectionType>();
        assert!(matches!(result, Err(Error::UnknownConnectionType(_))));
    }

    #[test]
    fn test_from_json_partial() {
        let settings = TerminalSettings::from_json(
            r#"{"device_address":" 10.1.1.1 ","connection_type":"tcpip","default_currency":"sek"}"#,
        )
        .unwrap();
        assert_eq!(settings.device_address, "10.1.1.1");
        assert_eq!(settings.default_currency.as_str(), "SEK");
        assert_eq!(settings.server_timeout_ms, DEFAULT_SERVER_TIMEOUT_MS);
    }

    #[test]
    fn test_from_json_rejects_blank_username() {
        let result = TerminalSettings::from_json(r#"{"login_username":"  "}"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_with_timeouts() {
        let settings = TerminalSettings::default().with_timeouts(
            Duration::from_millis(40),
            Duration::from_millis(20),
            Duration::from_micros(10),
        );
        assert_eq!(settings.primary_timeout_ms, 40);
        assert_eq!(settings.fallback_timeout_ms, 20);
        // Sub-millisecond bounds are clamped to one millisecond.
        assert_eq!(settings.server_timeout_ms, 1);
    }
}
