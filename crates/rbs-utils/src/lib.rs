//! Small concurrency primitives shared by RBS background workers.

pub mod sleeper;
pub mod throttle;

pub use sleeper::Sleeper;
pub use throttle::Throttle;
