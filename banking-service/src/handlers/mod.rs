//! HTTP handlers for banking-service.

pub mod alerts;
pub mod connections;
pub mod health;
pub mod sessions;
pub mod sync;
pub mod transactions;
