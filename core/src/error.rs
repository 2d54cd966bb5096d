//! Core error types for the LabBook service

use thiserror::Error;

/// Core error type for all operations
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vendor call {operation} failed: {message}")]
    Vendor { operation: String, message: String },

    #[error("Payment gateway error: {0}")]
    Payment(String),

    #[error("Location not serviceable: {0}")]
    NotServiceable(String),

    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("Could not resolve location: {0}")]
    Geolocation(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn vendor(operation: &str, message: impl Into<String>) -> Self {
        CoreError::Vendor {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_error_display() {
        let err = CoreError::vendor("createBooking", "slot already booked");
        assert_eq!(
            err.to_string(),
            "Vendor call createBooking failed: slot already booked"
        );
    }

    #[test]
    fn test_not_serviceable_display() {
        let err = CoreError::NotServiceable("110001".to_string());
        assert!(err.to_string().contains("not serviceable"));
    }

    #[test]
    fn test_invalid_signature_display() {
        assert_eq!(CoreError::InvalidSignature.to_string(), "Invalid signature");
    }
}
