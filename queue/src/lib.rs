//! # Durable Job Queue
//!
//! The deferred-work backbone of the capture system: a crash-safe job
//! store with dead-lettering, an append-only pending-signal store for
//! near-instant producer hooks, a batch accumulator, and the background
//! worker that drives the capture pipeline.
//!
//! Producers only ever call [`JobStore::enqueue`] or
//! [`PendingSignalStore::append`]; both return immediately. The worker
//! owns all slow work: claiming batches in FIFO order, honoring
//! sequential barriers, retrying with exponential backoff and moving
//! exhausted jobs to the dead-letter collection.

pub mod accumulator;
pub mod signals;
pub mod store;
pub mod worker;

pub use accumulator::BatchAccumulator;
pub use signals::PendingSignalStore;
pub use store::{JobStore, RetrySelector};
pub use worker::{Worker, WorkerState, drain};
