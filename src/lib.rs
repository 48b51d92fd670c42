//! Door alarm library.
//!
//! Watches a door reed switch on a GPIO input, keeps the monitoring record
//! on disk, and raises SMS alerts when the door opens while armed or stays
//! open too long.

pub mod config;
pub mod error;
pub mod instance_lock;
pub mod monitor;
pub mod notify;
pub mod sensor;
pub mod socket;
pub mod state;
