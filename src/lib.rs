//! hubstats — polls Docker Hub repository statistics into InfluxDB v2.
//!
//! Leaf-first: [`config`] resolves settings, [`provision`] makes sure the
//! bucket exists, [`registry`] fetches and decodes stats, [`publisher`]
//! turns each stat into a point and writes it, and [`poller`] drives the
//! whole thing on a fixed delay.

pub mod config;
pub mod error;
pub mod poller;
pub mod provision;
pub mod publisher;
pub mod registry;
pub mod store;

pub use config::Config;
pub use error::{HubStatsError, Result};
