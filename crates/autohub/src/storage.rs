//! Storage
//!
//! [`Folder`] is a sandboxed directory handed to components that need disk
//! space; names passed to it can never escape the directory. Configuration
//! values are persisted through the [`ConfigStore`] trait, implemented by
//! [`JsonConfigStore`] as one `<uuid>.json` file per object under
//! `<storage>/config/`.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use hub_types::{ConfigurationDescription, ValueMap};
use tracing::{debug, warn};

/// Sub-folder of the storage root holding configuration files
pub const CONFIG_FOLDER: &str = "config";

/// Sub-folder of the storage root holding per-plugin data
pub const DATA_FOLDER: &str = "data";

/// Sub-folder of the storage root holding class metadata documents
pub const METADATA_FOLDER: &str = "metadata";

/// Error type for storage access
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("'{0}' is not a valid file or folder name")]
    InvalidName(String),

    #[error("File already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Folder does not exist: {0}")]
    FolderNotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Folder
// ─────────────────────────────────────────────────────────────────────────────

/// How a file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAccess {
    Read,
    ReadWrite,
}

/// What to do when the file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationOptions {
    FailIfExists,
    OpenIfExists,
    ReplaceExisting,
}

/// A directory that only hands out direct children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    path: PathBuf,
}

impl Folder {
    /// Open (creating if needed) the storage root
    pub fn open_root(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(io_error(&path))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a child folder, optionally creating it
    pub fn open_folder(&self, name: &str, create: bool) -> StorageResult<Folder> {
        let path = self.child(name)?;
        if !path.is_dir() {
            if !create {
                return Err(StorageError::FolderNotFound(path));
            }
            fs::create_dir_all(&path).map_err(io_error(&path))?;
            debug!(path = %path.display(), "Created folder");
        }
        Ok(Folder { path })
    }

    pub fn file_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.child(name)?.is_file())
    }

    /// Open or create a file in this folder
    pub fn create_file(
        &self,
        name: &str,
        access: FileAccess,
        options: CreationOptions,
    ) -> StorageResult<File> {
        let path = self.child(name)?;
        let exists = path.is_file();
        let mut open = OpenOptions::new();
        open.read(true);
        match access {
            FileAccess::Read => {}
            FileAccess::ReadWrite => {
                open.write(true).create(true);
            }
        }
        match options {
            CreationOptions::FailIfExists if exists => {
                return Err(StorageError::AlreadyExists(path));
            }
            CreationOptions::ReplaceExisting if access == FileAccess::ReadWrite => {
                open.truncate(true);
            }
            _ => {}
        }
        open.open(&path).map_err(io_error(&path))
    }

    pub fn read_to_string(&self, name: &str) -> StorageResult<String> {
        let path = self.child(name)?;
        fs::read_to_string(&path).map_err(io_error(&path))
    }

    /// Replace the contents of a file
    pub fn write(&self, name: &str, contents: &str) -> StorageResult<()> {
        let path = self.child(name)?;
        fs::write(&path, contents).map_err(io_error(&path))
    }

    /// Names of the files in this folder with the given extension
    pub fn files_with_extension(&self, extension: &str) -> StorageResult<Vec<String>> {
        let entries = fs::read_dir(&self.path).map_err(io_error(&self.path))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error(&self.path))?;
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn child(&self, name: &str) -> StorageResult<PathBuf> {
        if !is_valid_name(name) {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.path.join(name))
    }
}

/// A plain file name: no separators, no relative components
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Store
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque persistence for configuration values
pub trait ConfigStore: Send + Sync {
    /// Load stored values, keeping only entries the description declares.
    /// A missing file yields an empty map.
    fn load(&self, filename: &str, description: &ConfigurationDescription)
    -> StorageResult<ValueMap>;

    fn save(&self, filename: &str, values: &ValueMap) -> StorageResult<()>;
}

/// JSON files in a single folder
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    folder: Folder,
}

impl JsonConfigStore {
    /// Store rooted at `<storage>/config/`
    pub fn new(storage: &Folder) -> StorageResult<Self> {
        Ok(Self {
            folder: storage.open_folder(CONFIG_FOLDER, true)?,
        })
    }

    pub fn folder(&self) -> &Folder {
        &self.folder
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(
        &self,
        filename: &str,
        description: &ConfigurationDescription,
    ) -> StorageResult<ValueMap> {
        if !self.folder.file_exists(filename)? {
            debug!(filename, "No stored configuration");
            return Ok(ValueMap::new());
        }
        let contents = self.folder.read_to_string(filename)?;
        let mut values: ValueMap =
            serde_json::from_str(&contents).map_err(|source| StorageError::Json {
                path: self.folder.path().join(filename),
                source,
            })?;
        values.retain(|name, _| {
            let known = description.contains(name);
            if !known {
                warn!(filename, entry = %name, "Dropping unknown configuration entry");
            }
            known
        });
        Ok(values)
    }

    fn save(&self, filename: &str, values: &ValueMap) -> StorageResult<()> {
        let json = serde_json::to_string_pretty(values).map_err(|source| StorageError::Json {
            path: self.folder.path().join(filename),
            source,
        })?;
        self.folder.write(filename, &json)?;
        debug!(filename, entries = values.len(), "Saved configuration");
        Ok(())
    }
}
