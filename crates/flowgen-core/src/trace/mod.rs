//! Session traces.
//!
//! Every event a session consumes can be appended as one JSON line, so a
//! finished or failed run can be replayed and audited afterwards.
//!
//! Storage: `<workspace>/.flowgen/traces/{day}/{session_id}.jsonl`

mod types;
mod writer;

pub use types::*;
pub use writer::*;
