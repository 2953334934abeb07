//! Turnstile - Per-Tenant Request Admission Control
//!
//! This crate decides whether an inbound request may proceed, based on a
//! weighted sliding-window estimate of each client's request rate. Limits,
//! exclusions and switches come from a per-tenant policy kept in the same
//! shared store as the window counters (in-memory or Redis).

pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod ratelimit;
pub mod store;
