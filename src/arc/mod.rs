//! ARC v1 files, bare or one gzip member per record.

pub mod meta;
pub mod parser;
pub mod reader;

pub use meta::ArcRecordMeta;
pub use parser::ArcRecordParser;
pub use reader::ArcFileReader;
