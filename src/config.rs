// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::Database;
use std::{
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

/// Key directory variant
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexType {
    /// Unordered hash directory; forward iteration only
    Hash,

    /// Ordered tree directory; supports reverse iteration and seeking
    BTree,
}

impl std::str::FromStr for IndexType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local_hash" => Ok(Self::Hash),
            "btree" => Ok(Self::BTree),
            _ => Err(()),
        }
    }
}

/// Storage backend variant
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StorageType {
    /// Local filesystem segment files
    LocalFile,
}

impl std::str::FromStr for StorageType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local_file" => Ok(Self::LocalFile),
            _ => Err(()),
        }
    }
}

const DEFAULT_DATA_DIR: &str = "/tmp/bytesdb";

const DEFAULT_MAX_FILE_SIZE: u64 = /* 1 MiB */ 1_024 * 1_024;

/// Database configuration builder
#[derive(Clone, Debug)]
pub struct Config {
    /// Root directory of all table folders
    #[doc(hidden)]
    pub path: PathBuf,

    /// Maximum size of a segment file in bytes
    ///
    /// When the next record would grow the active segment past this
    /// size, the segment is sealed and a new one is started.
    pub max_file_size: u64,

    /// Key directory variant
    pub index_type: IndexType,

    /// Storage backend variant
    pub storage_type: StorageType,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: DEFAULT_DATA_DIR.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            index_type: IndexType::Hash,
            storage_type: StorageType::LocalFile,
        }
    }
}

impl Config {
    /// Initializes a new config
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().into(),
            ..Default::default()
        }
    }

    /// Loads a config from a properties-style file.
    ///
    /// Blank lines and `#` comments are skipped; unrecognized keys are
    /// ignored. A missing file yields the default configuration.
    ///
    /// Recognized keys: `data.dir`, `storage.file.max.size`,
    /// `index.type` (`local_hash`, `btree`), `storage.type`
    /// (`local_file`).
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file exists but cannot be read.
    pub fn from_properties_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        if !path.try_exists()? {
            log::debug!("No config file at {path:?}, using defaults");
            return Ok(Self::default());
        }

        let mut config = Self::default();
        let reader = BufReader::new(std::fs::File::open(path)?);

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "data.dir" => config.path = value.into(),
                "storage.file.max.size" => {
                    if let Ok(size) = value.parse::<u64>() {
                        config.max_file_size = size;
                    } else {
                        log::warn!("Ignoring unparsable {key}={value}");
                    }
                }
                "index.type" => {
                    if let Ok(index_type) = value.parse() {
                        config.index_type = index_type;
                    } else {
                        log::warn!("Ignoring unknown index type {value:?}");
                    }
                }
                "storage.type" => {
                    if let Ok(storage_type) = value.parse() {
                        config.storage_type = storage_type;
                    } else {
                        log::warn!("Ignoring unknown storage type {value:?}");
                    }
                }
                _ => {}
            }
        }

        Ok(config)
    }

    /// Sets the maximum segment file size in bytes.
    ///
    /// Defaults to 1 MiB.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is 0.
    #[must_use]
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        assert!(bytes > 0, "invalid max file size");

        self.max_file_size = bytes;
        self
    }

    /// Sets the key directory variant.
    ///
    /// Defaults to [`IndexType::Hash`].
    #[must_use]
    pub fn index_type(mut self, index_type: IndexType) -> Self {
        self.index_type = index_type;
        self
    }

    /// Sets the storage backend variant.
    ///
    /// Defaults to [`StorageType::LocalFile`].
    #[must_use]
    pub fn storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    /// Opens a database using the config.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn open(self) -> crate::Result<Database> {
        Database::open(self)
    }
}
