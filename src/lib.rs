//! # desk — Discrete-Event Simulation Kernel
//!
//! Advances a logical clock and runs tasks in non-decreasing time order.
//! Task payloads are ordinary blocking code: they can sleep until a
//! simulated time, take reentrant locks and wait/notify on a condition.
//! A small pool of recycled OS threads carries the payloads, but only one
//! of them runs at any instant, so a given submission sequence always
//! executes the same way.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │           Runtime            │ ← submit / stop / resume / reset
//! │  ┌────────────────────────┐  │
//! │  │          Core          │  │ ← clock, ready FIFO, lock table
//! │  │  ┌──────────────────┐  │  │
//! │  │  │    EventQueue    │  │  │ ← waiting queue (tree or calendar)
//! │  │  └──────────────────┘  │  │
//! │  └────────────────────────┘  │
//! │  ┌────────────────────────┐  │
//! │  │   Workers (threads)    │  │ ← TaskContext: sleep, lock, wait
//! │  └────────────────────────┘  │
//! └──────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use desk::{ResourceId, Runtime};
//! use std::time::Duration;
//!
//! let rt = Runtime::with_defaults();
//! let r = ResourceId::new(1);
//! rt.submit_at(1.0, move |cx| {
//!     cx.lock(r)?;
//!     cx.sleep_for(2.5)?;
//!     cx.unlock(r);
//!     Ok(())
//! })?;
//! rt.wait_quiescent(Duration::from_secs(1))?;
//! assert_eq!(rt.now(), 3.5);
//! # Ok::<(), desk::KernelError>(())
//! ```

pub mod config;
pub mod error;
pub mod queue;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;
pub mod worker;

// Re-exports for convenience.
pub use config::{RuntimeConfig, TraceConfig};
pub use error::{KernelError, KernelResult};
pub use queue::{CalendarQueue, EventQueue, QueueBackend, TreeQueue};
pub use runtime::{Runtime, RuntimeState, RuntimeStats, TaskFault};
pub use sync::{LockInfo, ResourceId};
pub use task::{TaskHandle, TaskId};
pub use time::SimTime;
pub use worker::{TaskContext, WorkerId, WorkerInfo, WorkerState};
