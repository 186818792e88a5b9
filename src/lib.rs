pub mod error;
pub mod io_stream;
pub mod codec;
pub mod recovery;
pub mod record;
pub mod timestamp;
pub mod arc;
pub mod source;
pub mod iterator;
pub mod filter;
pub mod nedlib;
pub mod config;

pub use error::{ArcError, ErrorKind};
pub use arc::ArcFileReader;
pub use config::{IteratorOptions, ReaderOptions};
pub use record::{ArchiveRecord, RecordType, Validation};
pub use source::{RecordSource, SourceItem};
pub use iterator::{ErrorGuard, ErrorPolicy, RecordEnvelope, RecordError, RecordIterator};
pub use filter::RecordFilter;
pub use nedlib::NedlibReader;
