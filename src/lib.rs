//! # fleetpulse: Fleet Health Polling and Aggregation
//!
//! Periodically probes registered servers (standalone or clustered) over a
//! service registry, SSH and SQL, folds the results into one status document
//! per server with rolling disk/memory windows, and serves derived health to
//! a dashboard.
//!
//! ## Module map
//!
//! | Layer | Modules |
//! |-------|---------|
//! | data | [`model`], [`parsers`], [`window`], [`status`] |
//! | probes | [`shell`], [`registry`], [`dbprobe`] |
//! | persistence | [`store`], [`db`] |
//! | orchestration | [`coordinator`], [`scheduler`], [`registration`] |
//! | surface | [`dashboard`], [`config`], [`prom_metrics`] |

pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod db;
pub mod dbprobe;
pub mod model;
pub mod parsers;
pub mod prom_metrics;
pub mod registration;
pub mod registry;
pub mod scheduler;
pub mod shell;
pub mod status;
pub mod store;
pub mod window;
