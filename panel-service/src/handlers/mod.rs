//! HTTP handlers for panel-service.

pub mod admin;
pub mod auth;
pub mod metrics;
pub mod provision;
pub mod sites;
