//! Long-term story memory.
//!
//! Contains the anchor ledger and the compactor that keeps it bounded.

mod compactor;
pub mod ledger;

pub use compactor::{
    append_anchor, AppendOutcome, CompactionError, CompactionPolicy, DEFAULT_GLOBAL_RATIO,
    DEFAULT_MAX_CHARS, DEFAULT_PHASE_LINE_THRESHOLD,
};
pub use ledger::{AnchorLedger, LedgerEntry, GLOBAL_TAG, PHASE_TAG};
