//! Catalog core services
//!
//! Each service is a cheap-to-clone handle over the shared pool and clock.

pub mod achievements;
pub mod catalog;
pub mod ranking;
pub mod reconciliation;
pub mod retention;
pub mod sessions;
pub mod temporal;

pub use achievements::AchievementStore;
pub use catalog::CatalogStore;
pub use ranking::RankingAggregator;
pub use reconciliation::ReconciliationBatch;
pub use retention::{RetentionCleaner, RetentionReport};
pub use sessions::SessionService;
pub use temporal::TemporalQueryEngine;
