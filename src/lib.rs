//! REM (Random Exponential Marking) active queue management for rattan cells.
//!
//! [`cells::queue::RemQueue`] is the synchronous queue: FIFO storage, the admission test and
//! the link price update rule. [`cells::queue::QueueDisc`] drives its update rule from a
//! [`timer::Scheduler`].

pub mod cells;
#[cfg(feature = "serde")]
pub mod config;
pub mod error;
pub mod timer;
#[cfg(feature = "serde")]
pub(crate) mod utils;
