use crate::{OrchestratorError, OrchestratorResult};

pub trait ConfigValidator {
    fn validate(&self) -> OrchestratorResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> OrchestratorResult<()> {
        if value.trim().is_empty() {
            return Err(OrchestratorError::Configuration(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that a port number is valid
    pub fn validate_port(port: u16, field_name: &str) -> OrchestratorResult<()> {
        if port == 0 {
            return Err(OrchestratorError::Configuration(format!(
                "{field_name} cannot be 0"
            )));
        }
        Ok(())
    }

    /// Validate that a duration in seconds is strictly positive and finite
    pub fn validate_positive_seconds(seconds: f64, field_name: &str) -> OrchestratorResult<()> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(OrchestratorError::Configuration(format!(
                "{field_name} must be greater than 0"
            )));
        }
        Ok(())
    }

    /// Validate every entry of an address list
    pub fn validate_addresses(addresses: &[String], field_name: &str) -> OrchestratorResult<()> {
        for address in addresses {
            Self::validate_not_empty(address, field_name)?;
            if address.chars().any(char::is_whitespace) {
                return Err(OrchestratorError::Configuration(format!(
                    "{field_name} contains an invalid address: {address:?}"
                )));
            }
        }
        Ok(())
    }
}
