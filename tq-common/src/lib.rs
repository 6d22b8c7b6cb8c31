//! # TuneQuiz Common Library
//!
//! Shared code for the TuneQuiz services including:
//! - Error taxonomy shared by every service
//! - Configuration loading and root folder resolution
//! - Database initialization and settings access
//! - Clock abstraction used for all timestamps

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::{Clock, ManualClock, SharedClock, SystemClock};
