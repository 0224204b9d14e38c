//! Checkout shipping details.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shipping validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShippingError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Recipient details collected at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub name: String,
    pub phone: String,
    pub address: String,
}

impl ShippingInfo {
    /// Check that every field is filled in.
    ///
    /// # Errors
    ///
    /// Returns `ShippingError::MissingField` naming the first blank field.
    pub fn validate(&self) -> Result<(), ShippingError> {
        for (field, value) in [
            ("name", &self.name),
            ("phone", &self.phone),
            ("address", &self.address),
        ] {
            if value.trim().is_empty() {
                return Err(ShippingError::MissingField(field));
            }
        }
        Ok(())
    }
}
