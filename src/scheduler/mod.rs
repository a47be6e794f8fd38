//! Concurrent task scheduling.
//!
//! This module fans a task list out to a pool of workers:
//!
//! - **TaskQueue**: shared FIFO queue; every task is dispatched once
//! - **Scheduler**: spawns workers and streams results as they complete
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  Task list   │
//!                      └──────┬───────┘
//!                             │
//!                      ┌──────▼───────┐
//!                      │  TaskQueue   │
//!                      └──────┬───────┘
//!                             │
//!         ┌───────────────────┼───────────────────┐
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 1│         │ Worker 2│         │ Worker N│
//!    └────┬────┘         └────┬────┘         └────┬────┘
//!         └───────────────────┼───────────────────┘
//!                             ▼
//!                   result stream (mpsc)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use agent_bench::scheduler::Scheduler;
//!
//! let (handle, signal) = cancel_pair();
//! let scheduler = Scheduler::new(runner).with_cancel(signal);
//! let mut results = scheduler.run(tasks, 4);
//! while let Some(result) = results.next().await {
//!     report.add_result(result)?;
//! }
//! ```

pub mod queue;
pub mod worker_pool;

pub use queue::TaskQueue;
pub use worker_pool::{resolve_workers, PoolStats, Scheduler};
