//! Background tasks.
//!
//! - `rate_limit_sweeper` - periodic memory reclamation for the rate limiter

pub mod rate_limit_sweeper;

pub use rate_limit_sweeper::start_rate_limit_sweeper;
