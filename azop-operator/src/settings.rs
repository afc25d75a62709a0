//! Cloud settings read from the process environment.

use thiserror::Error;

pub const SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const TENANT_ID: &str = "AZURE_TENANT_ID";
pub const LOCATION: &str = "AZURE_LOCATION";
pub const OPERATOR_KEYVAULT: &str = "AZURE_OPERATOR_KEYVAULT";

const DEFAULT_LOCATION: &str = "westeurope";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),
    #[error("environment variable {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Settings required to provision resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudSettings {
    pub subscription_id: String,
    pub tenant_id: String,
    /// Location used when a spec does not pin one.
    pub default_location: String,
    /// KV mount holding published secrets when the vault backend is used.
    pub operator_keyvault: Option<String>,
}

impl CloudSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Parse settings through `lookup`, which returns the value of a variable if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let subscription_id = get(SUBSCRIPTION_ID).ok_or(SettingsError::Missing(SUBSCRIPTION_ID))?;
        let tenant_id = get(TENANT_ID).ok_or(SettingsError::Missing(TENANT_ID))?;
        let default_location = get(LOCATION).unwrap_or_else(|| DEFAULT_LOCATION.to_string());

        if subscription_id.contains('/') {
            return Err(SettingsError::Invalid {
                name: SUBSCRIPTION_ID,
                reason: "must not contain '/'".into(),
            });
        }

        Ok(Self {
            subscription_id,
            tenant_id,
            default_location,
            operator_keyvault: get(OPERATOR_KEYVAULT),
        })
    }
}
