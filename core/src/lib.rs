//! LabBook Core Library
//!
//! Domain models, vendor and payment adapters, and the booking
//! orchestration shared by the API server and the background worker.

pub mod adapter;
pub mod booking;
pub mod checksum;
pub mod domain;
pub mod error;
pub mod geo;

pub use error::{CoreError, Result};
