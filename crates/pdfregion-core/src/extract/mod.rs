//! Region extraction and page record assembly.

mod builder;
mod extractor;

pub use builder::{CancelFlag, OutputRow, PageRecordBuilder, RecordStream};
pub use extractor::{ExtractionResult, RegionExtractor, dump_file_name};
