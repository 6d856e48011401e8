//! satellite-api: REST client for Katello / Red Hat Satellite
//!
//! Provides [`SatelliteClient`], the HTTP implementation of
//! [`cvmanager_core::ContentApi`], and its [`ClientConfig`].

pub mod client;
pub mod config;
pub mod error;

pub use client::{resource_path, SatelliteClient};
pub use config::{ClientConfig, DEFAULT_TIMEOUT};
pub use error::ClientError;
