pub mod scanner;

pub use scanner::{find_record_start, ScanOutcome, RECORD_PREFIXES};
