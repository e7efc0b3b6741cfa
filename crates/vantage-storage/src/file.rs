//! Filesystem abstraction for batch files and their directories.
//!
//! A [`File`] is a named regular file inside a [`Directory`]; appends go
//! through the OS append mode so concurrent readers never observe a block
//! written at an interior offset. Directory-wide operations (move all,
//! delete all) are best-effort per file: one failing file is logged and
//! skipped rather than aborting the rest, since they run during consent
//! migration where partial progress beats losing everything.

use std::fs;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{StorageError, StorageResult};

/// A named regular file inside a storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
    name: String,
}

impl File {
    fn new(path: PathBuf, name: String) -> Self {
        Self { path, name }
    }

    /// Returns the file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the full path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `data` at the end of the file using OS-level append mode.
    pub fn append(&self, data: &[u8]) -> StorageResult<()> {
        let mut handle = fs::OpenOptions::new().append(true).open(&self.path)?;
        handle.write_all(data)?;
        Ok(())
    }

    /// Reads the whole file into memory.
    pub fn read(&self) -> StorageResult<Vec<u8>> {
        let mut data = Vec::new();
        fs::File::open(&self.path)?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Opens a buffered stream over the file for block-wise decoding.
    pub fn stream(&self) -> StorageResult<BufReader<fs::File>> {
        Ok(BufReader::new(fs::File::open(&self.path)?))
    }

    /// Returns the current size of the file in bytes.
    pub fn size(&self) -> StorageResult<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Deletes the file. Deleting an already-deleted file is not an error.
    pub fn delete(&self) -> StorageResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

/// A filesystem directory holding batch files for one consent state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    /// Creates the directory (and intermediate directories) if needed.
    pub fn create(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Wraps an existing path without touching the filesystem.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if the directory exists on disk.
    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Creates an empty file with the given name.
    ///
    /// Fails if a file with this name already exists, so a name collision
    /// can never truncate a batch that was already written.
    pub fn create_file(&self, name: &str) -> StorageResult<File> {
        let path = self.path.join(name);
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok(File::new(path, name.to_string()))
    }

    /// Returns `true` if a file with the given name exists.
    pub fn has_file(&self, name: &str) -> bool {
        self.path.join(name).is_file()
    }

    /// Returns the file with the given name, or an error if it is missing.
    pub fn file(&self, name: &str) -> StorageResult<File> {
        let path = self.path.join(name);
        if !path.is_file() {
            return Err(StorageError::FileNotFound {
                name: name.to_string(),
            });
        }
        Ok(File::new(path, name.to_string()))
    }

    /// Returns all regular files in the directory, in no particular order.
    pub fn files(&self) -> StorageResult<Vec<File>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => files.push(File::new(entry.path(), name)),
                Err(name) => {
                    warn!(name = ?name, "ignoring file with non-UTF-8 name");
                }
            }
        }
        Ok(files)
    }

    /// Deletes every file in the directory, best-effort per file.
    ///
    /// Returns the number of files deleted.
    pub fn delete_all_files(&self) -> StorageResult<usize> {
        let mut deleted = 0;
        for file in self.files()? {
            match file.delete() {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!(file = file.name(), error = %e, "failed to delete file");
                }
            }
        }
        Ok(deleted)
    }

    /// Moves every file in this directory into `destination`, best-effort per
    /// file.
    ///
    /// A failure to move one file does not abort moving the rest. Returns the
    /// number of files moved.
    pub fn move_all_files_to(&self, destination: &Directory) -> StorageResult<usize> {
        let mut moved = 0;
        for file in self.files()? {
            let target = destination.path.join(file.name());
            match fs::rename(file.path(), &target) {
                Ok(()) => moved += 1,
                Err(e) => {
                    warn!(file = file.name(), error = %e, "failed to move file");
                }
            }
        }
        Ok(moved)
    }

    /// Removes the directory and everything below it.
    ///
    /// Removing a directory that does not exist is not an error.
    pub fn delete(&self) -> StorageResult<()> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
