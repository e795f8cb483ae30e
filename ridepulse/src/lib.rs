//! Bike-share network pulse.
//!
//! Ingests the GBFS station metadata and status feeds, reconciles them into
//! a per-station view, derives system-wide metrics and keeps a bounded,
//! persisted history of those metrics. Degrades to stale or built-in data
//! rather than failing when the feeds are unreachable.

pub mod cache;
pub mod clock;
pub mod config;
pub mod feed;
pub mod gbfs;
pub mod history;
pub mod poller;
pub mod reconcile;
pub mod store;
pub mod web;

#[cfg(test)]
mod testing;
