//! Benchmark Executor
//!
//! Runs the expanded plan cell by cell and materializes the result table.
//!
//! ```text
//! Plan (from planner)
//!   │
//!   ▼
//! ┌───────────────┐   per cell: Setup → (Prepare → Benchmark stages →
//! │   execution   │   Conclude → Custom metrics) × samples → Cleanup
//! └───────┬───────┘
//!         │
//!         ▼
//!   ResultTable (long-format sample rows)
//! ```
//!
//! At most one benchmarked child process is ever alive; everything the engine
//! does concurrently (draining pipes, appending logs) happens on the far side
//! of a pipe and never competes with the child for a shielded core.

mod execution;

pub use execution::{request_interrupt, ExecutionOutcome, Executor};
