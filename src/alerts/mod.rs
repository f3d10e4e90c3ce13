//! Delay alert engine
//!
//! A scheduler periodically loads every business under monitoring, a queue
//! guarantees one cycle at a time per business, and each cycle recomputes the
//! business's delay and pushes notices to the customers it affects.

pub mod checker;
pub mod config;
pub mod delay;
pub mod notifier;
pub mod payload;
pub mod queue;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use checker::{AlertWorker, CycleError, CycleOutcome, CycleReport};
pub use config::{AlertConfig, AlertState};
pub use delay::{has_delay, mean_delay, NotificationWindow};
pub use notifier::{
    DeliveryFailures, HttpPushTransport, LogPushTransport, NotificationSender, NotifierError,
    PushTransport,
};
pub use payload::NotificationPayload;
pub use queue::QueueManager;
pub use scheduler::{fetch_states, FetchError, Scheduler};
