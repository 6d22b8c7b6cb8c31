//! HTTP API handlers for tq-catalog

pub mod achievements;
pub mod batch;
pub mod catalog;
pub mod health;
pub mod sessions;

pub use achievements::achievement_routes;
pub use batch::batch_routes;
pub use catalog::catalog_routes;
pub use health::health_routes;
pub use sessions::session_routes;
