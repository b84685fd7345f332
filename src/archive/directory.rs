use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use super::FileSource;

/// Files under a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves each path component against the directory listing, ignoring case.
    fn find_ignore_case(&self, path: &str) -> io::Result<Option<PathBuf>> {
        let mut current = self.root.clone();
        for component in path.split(['/', '\\']).filter(|c| !c.is_empty()) {
            let exact = current.join(component);
            if exact.exists() {
                current = exact;
                continue;
            }
            let entries = match fs::read_dir(&current) {
                Ok(entries) => entries,
                Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
                Err(error) => return Err(error),
            };
            let mut found = None;
            for entry in entries {
                let entry = entry?;
                if entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.eq_ignore_ascii_case(component))
                {
                    found = Some(entry.path());
                    break;
                }
            }
            match found {
                Some(path) => current = path,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

impl FileSource for DirectorySource {
    type Error = io::Error;

    fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        let Some(path) = self.find_ignore_case(path)? else {
            return Ok(None);
        };
        match fs::read(&path) {
            Ok(content) => Ok(Some(content)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }
}
