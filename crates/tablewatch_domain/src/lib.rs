pub mod browse;
pub mod checker;
pub mod config;
pub mod extract;
pub mod ledger;
pub mod notifications;
pub mod payload;
pub mod time;

pub use crate::checker::{AvailabilityChecker, AvailabilityCheckerBuilder};
