//! Agent subprocess plumbing: line decoding, process supervision.

pub mod decoder;
pub mod process;

pub use decoder::{LineDecoder, Record, RecordError};
pub use process::{
    DEFAULT_IDLE_TIMEOUT, ProcessOutcome, ProcessStream, SpawnSpec, TERMINATION_GRACE,
    spawn_json_process,
};
