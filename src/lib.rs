//! Grid-Bot Dashboard Sync Client
//!
//! A headless poll-and-reconcile client for a grid-trading bot backend. It
//! mirrors the backend's state into typed local views on a fixed cadence
//! and fires control actions back at it.
//!
//! ## Architecture
//!
//! - **Poller** drives one scoped refresh per tick for the active view
//! - **Tab reconciliation** converges mounted pair views to the backend's
//!   active pair set on every status poll
//! - **Chart registry** caches per-target chart handles, updated in place
//!   so zoom state survives refreshes
//! - **Render dedup cache** fingerprints payloads and skips writes whose
//!   content did not change since the last pass
//! - **Action dispatcher** fires control POSTs and refreshes only the scope
//!   the confirmed action touched
//! - **Generation tokens** discard responses that raced a view switch

pub mod api;
pub mod app;
pub mod chart;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod poller;
pub mod reconcile;
pub mod render;
pub mod symbol;
