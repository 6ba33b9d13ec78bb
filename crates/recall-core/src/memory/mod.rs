//! Response processing.
//!
//! ```text
//! backend reply ──► parser ──► ObservationRecord / SummaryRecord
//!                                   │ key: handle + source item + block
//!                                   ▼
//!                        MemoryRecordStorage (put_if_not_exists)
//! ```

pub mod parser;
pub mod processor;

pub use parser::{ParsedObservation, ParsedSummary, parse_observations, parse_summary};
pub use processor::{
    ProcessOutcome, ResponseContext, ResponseProcessor, StoredResponseProcessor, turn_source_id,
};
