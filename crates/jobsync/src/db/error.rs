use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("job store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cannot create job store directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema upgrade to version {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A thread panicked while holding the connection.
    #[error("job store connection lock poisoned")]
    LockPoisoned,
}
