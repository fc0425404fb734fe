//! Data models

pub mod observable;
pub mod stats;
pub mod threat;

pub use observable::*;
pub use stats::*;
pub use threat::*;
