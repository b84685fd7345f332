use std::{collections::HashMap, convert::Infallible};

use super::FileSource;

/// Files held in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_ascii_lowercase()
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<P: AsRef<str>>(&mut self, path: P, content: Vec<u8>) -> &mut Self {
        self.files.insert(normalize(path.as_ref()), content);
        self
    }

    pub fn with<P: AsRef<str>>(mut self, path: P, content: Vec<u8>) -> Self {
        self.insert(path, content);
        self
    }
}

impl FileSource for MemorySource {
    type Error = Infallible;

    fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.files.get(&normalize(path)).cloned())
    }
}
