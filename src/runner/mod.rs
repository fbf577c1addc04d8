//! Per-test execution.
//!
//! # Architecture
//!
//! ```text
//! WorkItem → UnitRunner → container (ctest -R '^name$') → RunResult
//!                 │
//!                 └── live output → Transcript ("[name] line")
//! ```
//!
//! A [`UnitRunner`] owns exactly one container and the two output buffers for
//! its test until it produces the [`RunResult`].

pub mod result;
pub mod transcript;
pub mod unit;

pub use result::{RunResult, UnitOutcome};
pub use transcript::{Console, Tagged, Transcript};
pub use unit::UnitRunner;
