//! Bounded parallel execution: worker-pool provisioning, cooperative
//! cancellation, and order-preserving task drivers.

mod cancel;
mod executor;
mod process;

pub use cancel::CancellationToken;
pub use executor::{available_cpus, sensible_threads, ExecutorProvider, PoolSize};
pub use process::{progressive, unbound, CountingTaskFactory, TaskFactory, UnboundHandle};
