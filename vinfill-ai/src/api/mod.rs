//! HTTP control surface for vinfill-ai

pub mod cache;
pub mod daemon;
pub mod health;
pub mod items;

pub use cache::cache_routes;
pub use daemon::daemon_routes;
pub use health::health_routes;
pub use items::item_routes;
