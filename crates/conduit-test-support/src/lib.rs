//! Shared test doubles and utilities for the Conduit pipeline.

mod broker;
mod clock;
mod storage;
mod tokens;

pub use broker::RecordingBroker;
pub use clock::{FixedClock, ManualClock};
pub use storage::{FailingStorage, InMemoryStorage};
pub use tokens::SequenceTokens;
