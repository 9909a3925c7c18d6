pub mod discovery;
pub mod input;
pub mod mmap;
pub mod output;

pub use discovery::{DiscoveredFile, discover_files};
pub use input::{FileDataProvider, FromArrayProvider, FromFilePathProvider, FromStreamProvider};
pub use mmap::MmapInput;
pub use output::{MAX_ARRAY_OUTPUT_SIZE, OutputArrayProvider, OutputDataProvider, OutputFileProvider};
