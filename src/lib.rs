//! delaywatch: delay alerts for appointment-based businesses
//!
//! Businesses opt into delay monitoring. Every few minutes the engine
//! averages how late today's appointments actually started, and when a
//! business is running behind it pushes a web notification to the customers
//! whose appointments are coming up. When the delay clears, those customers
//! get an all-clear.
//!
//! # Example
//!
//! ```no_run
//! use delaywatch::api::{run_server, ServerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! run_server(ServerConfig::default()).await
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod clock;
pub mod data;
pub mod sms;
pub mod storage;

// Re-export commonly used types
pub use alerts::{AlertConfig, AlertState, AlertWorker, QueueManager, Scheduler};
pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use data::{Appointment, Business};
pub use storage::{AlertStore, MemoryStore, StoreError};
