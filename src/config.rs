//! Reader configuration.
//!
//! ```no_run
//! use solidarc::config::ReaderOptions;
//!
//! let opts = ReaderOptions::from_json_file("reader.json")?
//!     .with_password("hunter2")
//!     .strict(true);
//! # Ok::<(), solidarc::Error>(())
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default ceiling on a folder's decoded size: 1 GiB.
pub const DEFAULT_MAX_FOLDER_SIZE: u64 = 1 << 30;

/// Options for [`crate::io_stream::SolidReader::open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Key material for encrypted folders.  Never written back out.
    #[serde(skip_serializing)]
    pub password:        Option<String>,
    /// Return folder decode faults from `jump_to`/`next_entry` instead of
    /// degrading the folder to an empty buffer.
    pub strict:          bool,
    /// Check folder CRCs after decode and entry CRCs on whole-file reads.
    pub verify_crc:      bool,
    /// Folders declaring a larger decoded size are never allocated.
    pub max_folder_size: u64,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            password:        None,
            strict:          false,
            verify_crc:      true,
            max_folder_size: DEFAULT_MAX_FOLDER_SIZE,
        }
    }
}

impl ReaderOptions {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn verify_crc(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    pub fn max_folder_size(mut self, limit: u64) -> Self {
        self.max_folder_size = limit;
        self
    }
}
