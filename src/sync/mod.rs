//! Lock / wait / notify bookkeeping.
//!
//! The kernel's only mutual-exclusion primitive. Each shared resource is
//! named by a [`ResourceId`]; the runtime keeps a side table from id to
//! [`LockRecord`], created lazily on first use. The resource never owns
//! its record.
//!
//! This module is pure state: it decides who holds what and who is
//! queued. Parking and waking workers is done by the runtime, which turns
//! every hand-off returned from here into a `Notify` task.
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`resource`] | [`ResourceId`] newtype |
//! | [`record`] | [`LockRecord`], [`LockTable`], [`LockInfo`] |

pub mod record;
pub mod resource;

pub use record::{Acquire, LockInfo, LockRecord, LockTable, Pending, Release};
pub use resource::ResourceId;
