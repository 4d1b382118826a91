// crates/devdash-server/src/lib.rs
// devdash - local project dashboard core (scan, score, merge, refresh)

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod activity;
pub mod annotations;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod merge;
pub mod pipeline;
pub mod scanner;
pub mod service;
pub mod signals;
pub mod utils;

pub use error::{DevdashError, Result};
pub use service::DashboardService;
