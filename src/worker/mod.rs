//! Workers: pooled threads that run task payloads.
//!
//! | Module    | Contents                                              |
//! |-----------|-------------------------------------------------------|
//! | `id`      | [`WorkerId`] newtype                                  |
//! | `state`   | [`WorkerState`] and the [`WorkerInfo`] snapshot       |
//! | `handle`  | Mailbox, parking and the generation counter           |
//! | `context` | [`TaskContext`] and the blocking primitives           |
//! | `thread`  | The OS thread's main loop                             |

pub mod context;
pub(crate) mod handle;
pub mod id;
pub mod state;
pub(crate) mod thread;

pub use context::TaskContext;
pub use id::WorkerId;
pub use state::{WorkerInfo, WorkerState};
