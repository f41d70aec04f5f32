//! Worker orchestration over durable on-disk queues.
//!
//! The two long-running workers of an atlas share nothing but files:
//!
//! - [`AtlasWorker`] owns the world, trims regions into the region queue,
//!   runs inference, and merges surveys from the survey queue.
//! - [`SurveyWorker`] pops regions, expands them, and pushes surveys.
//!
//! [`DurableQueue`] moves whole files between them by rename, and
//! [`Sleeper`] paces polling of an empty queue.

mod cartographer;
mod error;
mod queue;
mod sleeper;
mod surveyor;

pub use cartographer::{AtlasWorker, CartographerConfig};
pub use error::WorkerError;
pub use queue::DurableQueue;
pub use sleeper::{MAX_SLEEP, MIN_SLEEP, Sleeper};
pub use surveyor::SurveyWorker;
