//! Banking Service - Bank feed synchronization, invoice auto-matching and reconciliation.

pub mod config;
pub mod dtos;
pub mod events;
pub mod handlers;
pub mod integrations;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod store;
