pub mod extractable;
pub mod listing;
pub mod settings;
pub mod source;
pub mod unpacker;

pub use extractable::{ExtractTarget, ExtractableBlock, plan_extraction};
pub use listing::{ArchiveListing, ListedFile};
pub use settings::UnpackerSettings;
pub use source::NxSource;
pub use unpacker::{ExtractedFile, NxUnpacker};
