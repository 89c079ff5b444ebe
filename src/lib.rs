//! Data Fabric
//!
//! Shared ingestion engine for exchange, on-chain, macro and news feeds:
//! rate-limited fetching, retried writes into a document store, and
//! edge-triggered alerts on failure streaks.

pub mod config;
pub mod error;
pub mod ingester;
pub mod notify;
pub mod storage;

#[cfg(test)]
mod config_tests;
