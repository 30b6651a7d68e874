//! Value types exchanged with the device driver.
//!
//! These mirror the shapes the vendor driver accepts: a string-keyed
//! configuration map, integer status codes, a fixed-point amount and a few
//! request records.

use payterm_core::ConnectionType;
use payterm_core::constants::{
    PAIRING_CONNECTION_TIMEOUT_MS, PAIRING_RETRY_ATTEMPTS, STATUS_SUCCESS,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{DeviceError, Result};

/// Driver configuration key for the connection type.
pub const KEY_CONNECTION_TYPE: &str = "DeviceConnectionType";
/// Driver configuration key for the terminal address.
pub const KEY_DEVICE_ADDRESS: &str = "DeviceAddress";
pub const KEY_FORCE_NEW_DEVICE: &str = "ForceNewDevice";
pub const KEY_CLEAR_STORED_CONFIGURATION: &str = "ClearStoredConfiguration";
pub const KEY_IGNORE_STORED_DEVICE: &str = "IgnoreStoredDevice";
pub const KEY_RESET_STORED_DEVICE_CONFIGURATION: &str = "ResetStoredDeviceConfiguration";
pub const KEY_RETRY_ATTEMPTS: &str = "DeviceRetryAttempts";
pub const KEY_CONNECTION_TIMEOUT: &str = "DeviceConnectionTimeout";
pub const KEY_SERVER_PORT: &str = "ServerPort";
pub const KEY_OPERATION_MODE: &str = "DeviceOperationMode";

/// Status returned by the driver, either synchronously or inside an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Raw vendor status code.
    pub code: i32,

    /// Human-readable vendor message.
    pub message: String,
}

impl DeviceStatus {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Status with the success code.
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(STATUS_SUCCESS, message)
    }

    pub fn is_success(&self) -> bool {
        self.code == STATUS_SUCCESS
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Configuration submitted to the driver for one initialization attempt.
///
/// A fresh value is built for every strategy; the driver never sees a config
/// mutated between attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub device_address: Option<String>,
    pub connection_type: ConnectionType,
    pub force_new_device: bool,
    pub clear_stored_configuration: bool,
    pub ignore_stored_device: bool,
    pub reset_stored_device_configuration: bool,
    pub retry_attempts: Option<u32>,
    pub connection_timeout_ms: Option<u64>,
    pub server_port: Option<u16>,
    pub operation_mode: Option<String>,
}

impl ConnectionConfig {
    /// Address and connection type only, no pairing flags.
    pub fn minimal(address: impl Into<String>, connection_type: ConnectionType) -> Self {
        Self {
            device_address: Some(address.into()),
            connection_type,
            force_new_device: false,
            clear_stored_configuration: false,
            ignore_stored_device: false,
            reset_stored_device_configuration: false,
            retry_attempts: None,
            connection_timeout_ms: None,
            server_port: None,
            operation_mode: None,
        }
    }

    /// Aggressive first-time pairing configuration.
    ///
    /// Forces the driver to treat the terminal as a new device, drop any
    /// stored configuration, retry harder and wait longer.
    pub fn full(address: impl Into<String>, connection_type: ConnectionType) -> Self {
        Self {
            force_new_device: true,
            clear_stored_configuration: true,
            ignore_stored_device: true,
            reset_stored_device_configuration: true,
            retry_attempts: Some(PAIRING_RETRY_ATTEMPTS),
            connection_timeout_ms: Some(PAIRING_CONNECTION_TIMEOUT_MS),
            ..Self::minimal(address, connection_type)
        }
    }

    /// Server-listen configuration: the terminal connects to us.
    pub fn server(port: u16) -> Self {
        Self {
            device_address: None,
            server_port: Some(port),
            operation_mode: Some(ConnectionType::Server.as_str().to_string()),
            ..Self::minimal("", ConnectionType::Server)
        }
    }

    /// Whether any first-time pairing flag is set.
    pub fn is_pairing(&self) -> bool {
        self.force_new_device
            || self.clear_stored_configuration
            || self.ignore_stored_device
            || self.reset_stored_device_configuration
    }

    /// Render the configuration as the driver's string map.
    pub fn to_values(&self) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        values.insert(
            KEY_CONNECTION_TYPE.to_string(),
            self.connection_type.as_str().to_string(),
        );
        if let Some(address) = &self.device_address {
            values.insert(KEY_DEVICE_ADDRESS.to_string(), address.clone());
        }

        for (key, flag) in [
            (KEY_FORCE_NEW_DEVICE, self.force_new_device),
            (KEY_CLEAR_STORED_CONFIGURATION, self.clear_stored_configuration),
            (KEY_IGNORE_STORED_DEVICE, self.ignore_stored_device),
            (
                KEY_RESET_STORED_DEVICE_CONFIGURATION,
                self.reset_stored_device_configuration,
            ),
        ] {
            if flag {
                values.insert(key.to_string(), "true".to_string());
            }
        }

        if let Some(attempts) = self.retry_attempts {
            values.insert(KEY_RETRY_ATTEMPTS.to_string(), attempts.to_string());
        }
        if let Some(timeout) = self.connection_timeout_ms {
            values.insert(KEY_CONNECTION_TIMEOUT.to_string(), timeout.to_string());
        }
        if let Some(port) = self.server_port {
            values.insert(KEY_SERVER_PORT.to_string(), port.to_string());
        }
        if let Some(mode) = &self.operation_mode {
            values.insert(KEY_OPERATION_MODE.to_string(), mode.clone());
        }
        values
    }
}

/// Credentials presented on login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: Option<String>,
    pub shift_number: Option<String>,
}

impl LoginCredentials {
    /// Username-only credentials, which is all the terminal requires.
    pub fn username(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            shift_number: None,
        }
    }
}

/// Fixed-point amount in the driver's representation: `mantissa * 10^-scale`.
///
/// Built straight from a [`Decimal`] so no binary floating point is ever
/// involved; `12.50` reaches the driver as mantissa `1250`, scale `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAmount {
    pub mantissa: i64,
    pub scale: u32,
}

impl DeviceAmount {
    /// Convert a decimal into the driver representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the mantissa does not fit the driver's 64-bit field.
    ///
    /// # Examples
    ///
    /// ```
    /// use payterm_device::DeviceAmount;
    /// use rust_decimal::Decimal;
    ///
    /// let amount = DeviceAmount::from_decimal("12.50".parse::<Decimal>().unwrap()).unwrap();
    /// assert_eq!((amount.mantissa, amount.scale), (1250, 2));
    /// ```
    pub fn from_decimal(value: Decimal) -> Result<Self> {
        let mantissa = i64::try_from(value.mantissa()).map_err(|_| {
            DeviceError::invalid_data(format!("amount {value} exceeds driver precision"))
        })?;
        Ok(Self {
            mantissa,
            scale: value.scale(),
        })
    }

    /// Convert back to a decimal without loss.
    ///
    /// # Errors
    ///
    /// Returns an error if `scale` exceeds what a decimal can carry (28).
    pub fn to_decimal(&self) -> Result<Decimal> {
        Decimal::try_new(self.mantissa, self.scale).map_err(|e| {
            DeviceError::invalid_data(format!(
                "amount {}e-{} out of range: {e}",
                self.mantissa, self.scale
            ))
        })
    }
}

impl fmt::Display for DeviceAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Ok(value) => write!(f, "{value}"),
            Err(_) => write!(f, "{}e-{}", self.mantissa, self.scale),
        }
    }
}

/// Session transaction opened by `start_session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTransaction {
    pub currency: String,
}

/// Payment handed to the driver by `start_payment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInstruction {
    pub payment_id: String,
    pub total: DeviceAmount,
    pub currency: String,
}

/// Host decision sent back on a host authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostDecision {
    Authorized,
    Declined,
}

/// Response to a host authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAuthorizationResponse {
    pub authorization_code: String,
    pub decision: HostDecision,
    pub emv_data: BTreeMap<String, String>,
    pub amount: DeviceAmount,
}
