//! Bounded-concurrency scheduling of test containers.
//!
//! - **BatchPlan**: partition of the ordered test list into fixed-size batches
//! - **BatchScheduler**: runs one batch at a time, all tests of a batch at once
//!
//! # Architecture
//!
//! ```text
//!   tests: [t0 t1 t2 ... t24]        batch_size = 10
//!
//!   batch 1: t0..t9    ──► 10 containers ──► wait for all
//!   batch 2: t10..t19  ──► 10 containers ──► wait for all
//!   batch 3: t20..t24  ──►  5 containers ──► wait for all
//! ```
//!
//! Concurrency is cooperative: every unit is an I/O-bound supervision of an
//! external process, so one tokio task drives a whole batch through
//! `join_all`.

pub mod batch;
pub mod plan;

pub use batch::{BatchScheduler, BatchStats};
pub use plan::BatchPlan;
