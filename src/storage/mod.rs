pub mod engine;
pub mod store;

pub use engine::{MemoryStore, Milestone};
pub use store::{AlertStore, DelayUpdate, StoreError};
