//! Vigia kernel: mirrors network telemetry from an Observium instance into a
//! durable store and augments it with per-series forecasts.
//!
//! Pipeline: [`scheduler`] tick → [`fetch`] → [`reconcile`] (alerts),
//! [`forecast`] (graphs) or [`aggregate`] (ports, devices) → [`store`].
//! [`queries`] is the seam for an HTTP layer.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod fetch;
pub mod forecast;
pub mod health;
pub mod jobs;
pub mod models;
pub mod queries;
pub mod reconcile;
pub mod scheduler;
pub mod state;
pub mod store;
