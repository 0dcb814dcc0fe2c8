pub mod archive;
pub mod layout;

pub use archive::{archive_to_base64, build_archive, extract_archive, ArchiveFormat};
pub use layout::{remove_tree, StorageLayout};
