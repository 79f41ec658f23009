//! Utility modules for vinfill-ai

pub mod clock;
pub mod db_retry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use db_retry::retry_on_lock;
