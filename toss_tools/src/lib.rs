//! Client for the Toss-style payment provider API.
//!
//! This crate wraps the two outbound calls the settlement engine makes against the provider (confirm and
//! cancel) behind the engine's [`checkout_engine::PaymentGateway`] trait, and translates transport and
//! HTTP failures into the engine's typed gateway errors.
mod api;
mod config;
mod data_objects;
mod error;

pub use api::TossApi;
pub use config::TossConfig;
pub use data_objects::{CancelEntry, CancelResponse, ConfirmBody, PaymentResponse};
pub use error::TossApiError;
