//! Logical monitors for green threads
//!
//! Holding a monitor means the object sits on the holder's monitor stack.
//! Contention parks the thread in `WaitingForMonitor` and hands control back
//! to the scheduler; no OS primitive is involved.

mod monitor;
mod wait_set;

pub use monitor::BlockReason;
pub use wait_set::{WaitSet, WaitSets};
