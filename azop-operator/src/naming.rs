//! Cloud-side naming rules per kind.
//!
//! A name that breaks these rules can never be provisioned, so violations are
//! reported as configuration errors before any control-plane call.

use azop_core::ManagerError;

use crate::kind::Kind;

/// Check `name` against the naming rules of `kind`.
pub fn validate(kind: Kind, name: &str) -> Result<(), ManagerError> {
    let violation = match kind {
        Kind::ResourceGroup => resource_group(name),
        Kind::EventhubNamespace => eventhub_namespace(name),
        Kind::Eventhub => eventhub(name),
        Kind::ConsumerGroup => consumer_group(name),
        Kind::StorageAccount => storage_account(name),
        Kind::KeyVault => key_vault(name),
    };
    match violation {
        None => Ok(()),
        Some(rule) => Err(ManagerError::configuration(format!(
            "invalid {kind} name '{name}': {rule}"
        ))),
    }
}

/// Reject an empty or unknown value for a spec field.
pub fn require_one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), ManagerError> {
    if allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) {
        Ok(())
    } else {
        Err(ManagerError::configuration(format!(
            "{field} '{value}' is not one of {}",
            allowed.join(", ")
        )))
    }
}

pub fn require_range(field: &str, value: u32, min: u32, max: u32) -> Result<(), ManagerError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ManagerError::configuration(format!(
            "{field} must be between {min} and {max}, got {value}"
        )))
    }
}

pub fn require_location(location: &str) -> Result<(), ManagerError> {
    if location.is_empty() || !location.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ManagerError::configuration(format!(
            "invalid location '{location}'"
        )));
    }
    Ok(())
}

fn length(name: &str, min: usize, max: usize) -> Option<&'static str> {
    let len = name.chars().count();
    if len < min {
        Some("too short")
    } else if len > max {
        Some("too long")
    } else {
        None
    }
}

fn resource_group(name: &str) -> Option<&'static str> {
    length(name, 1, 90).or_else(|| {
        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')'))
        {
            Some("only alphanumerics, underscores, hyphens, periods and parentheses are allowed")
        } else if name.ends_with('.') {
            Some("must not end with a period")
        } else {
            None
        }
    })
}

fn eventhub_namespace(name: &str) -> Option<&'static str> {
    length(name, 6, 50).or_else(|| {
        if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            Some("must start with a letter")
        } else if !name.ends_with(|c: char| c.is_ascii_alphanumeric()) {
            Some("must end with a letter or number")
        } else if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            Some("only letters, numbers and hyphens are allowed")
        } else {
            None
        }
    })
}

fn eventhub(name: &str) -> Option<&'static str> {
    length(name, 1, 256).or_else(|| {
        if !name.starts_with(|c: char| c.is_ascii_alphanumeric())
            || !name.ends_with(|c: char| c.is_ascii_alphanumeric())
        {
            Some("must start and end with a letter or number")
        } else if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
        {
            Some("only letters, numbers, periods, hyphens and underscores are allowed")
        } else {
            None
        }
    })
}

fn consumer_group(name: &str) -> Option<&'static str> {
    length(name, 1, 50).or_else(|| {
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
        {
            Some("only letters, numbers, periods, hyphens and underscores are allowed")
        } else {
            None
        }
    })
}

fn storage_account(name: &str) -> Option<&'static str> {
    length(name, 3, 24).or_else(|| {
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            Some("only lowercase letters and numbers are allowed")
        } else {
            None
        }
    })
}

fn key_vault(name: &str) -> Option<&'static str> {
    length(name, 3, 24).or_else(|| {
        if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            Some("must start with a letter")
        } else if !name.ends_with(|c: char| c.is_ascii_alphanumeric()) {
            Some("must end with a letter or number")
        } else if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            Some("only letters, numbers and hyphens are allowed")
        } else if name.contains("--") {
            Some("consecutive hyphens are not allowed")
        } else {
            None
        }
    })
}
