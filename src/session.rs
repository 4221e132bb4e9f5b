// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Identity of one logical store: a schema plus a table name
///
/// Each session owns one segment log and one key directory. Sessions
/// are cheap to clone.
///
/// # Examples
///
/// ```
/// # use bytes_kv::Session;
/// let session = Session::new("public", "users");
/// assert_eq!("public", session.schema());
/// assert_eq!("users", session.table());
/// ```
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Session {
    schema: Arc<str>,
    table: Arc<str>,
}

impl Session {
    /// Creates a new session identity.
    pub fn new<S: Into<Arc<str>>, T: Into<Arc<str>>>(schema: S, table: T) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Returns the schema name.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the table folder below the given root directory.
    #[must_use]
    pub fn folder(&self, root: &Path) -> PathBuf {
        root.join(&*self.schema).join(&*self.table)
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}
