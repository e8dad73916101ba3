//! Discrete-event runtime
//!
//! The runtime is a single-threaded executor over simulated time: a kernel
//! with a virtual clock and an ordered resumption queue, activities expressed
//! as plain futures that suspend on timers, CPU grants or other activities,
//! and a capacity-1 CPU resource with FIFO or preemptive-priority grants.

pub mod activity;
pub mod kernel;
pub mod resource;

pub use activity::{Interrupt, InterruptCause, JoinHandle, Resumed, TaskId, Timeout};
pub use kernel::Sim;
pub use resource::{Acquire, Cpu, CpuGrant, CpuMode};
