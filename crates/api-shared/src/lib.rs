//! # API Shared
//!
//! Shared definitions for the HMIS API surface.
//!
//! Contains:
//! - Request/response DTOs with OpenAPI schemas (`dto` module)
//! - The `HealthService`
//! - Authentication and permission-gating utilities
//!
//! Used by `api-rest` and the CLI for common functionality.

pub mod auth;
pub mod dto;
pub mod health;

pub use health::HealthService;
