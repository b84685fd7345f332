use std::error::Error;

mod directory;
mod memory;

pub use directory::DirectorySource;
pub use memory::MemorySource;

/// Where the sibling files of a model are read from.
///
/// Paths use `/` separators and are relative to the source root. Studio model file names are
/// case-insensitive, so implementations should match them that way.
pub trait FileSource {
    type Error: Error;

    /// Reads a whole file. A missing file is `Ok(None)`, not an error.
    fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>, Self::Error>;
}
