mod pool;
mod retry;
mod task;
mod error;

pub use pool::{WorkerPool, WorkerSlot};
pub use retry::{Attempted, RetryError, RetryExecutor, RetryPolicy};
pub use task::{ImageTask, ItemInput, ItemOutput, Produced};
pub use error::{WorkerError, WorkerResult};
