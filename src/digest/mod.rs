//! Content digests of binary data, files and remote images.
//!
//! Digests are computed on a single shared background worker when one can be
//! started. Requests are queued and handed to the worker one at a time, in
//! the order they were made. Without a worker, each request is hashed on the
//! current Tokio runtime instead, or on a background runtime when called from
//! outside of one.
use std::{io, path::PathBuf, str::FromStr};

use md5::{Digest as _, Md5};
use url::Url;

mod engine;
mod queue;
mod source;
mod worker;

pub use engine::{DigestEngine, DigestEngineBuilder, DigestHandle};
pub use source::{DigestOptions, DigestSource, HttpSourceReader, SourceKind, SourceReader};
pub use worker::{HashWorker, ThreadWorker, WorkerReply};

/// Length of a digest in hex characters.
pub const DIGEST_LENGTH: usize = 32;

/// Errors reported through digest callbacks.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// A file source could not be read.
    #[error("could not read `{}`", path.display())]
    ReadFile {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A remote source could not be fetched.
    #[error("could not fetch `{url}`")]
    Fetch {
        /// URL that was fetched.
        url: Url,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// A delegation descriptor could not be interpreted.
    #[error("invalid digest source: {0}")]
    InvalidSource(String),

    /// Hashing itself failed, e.g. the worker went away mid-task.
    #[error("digest computation failed: {0}")]
    Computation(String),
}

/// Completion callback of a digest request. Invoked exactly once.
pub type Callback = Box<dyn FnOnce(Result<Digest, DigestError>) + Send + 'static>;

/// MD5 checksum of some content, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(String);

impl Digest {
    /// Hash `bytes` on the current thread.
    ///
    /// # Example
    ///
    /// ```rust
    /// use imgstore_auth::digest::Digest;
    ///
    /// let digest = Digest::compute(b"hello");
    /// assert_eq!(digest.as_str(), "5d41402abc4b2a76b9719d911017c592");
    /// ```
    pub fn compute(bytes: &[u8]) -> Self {
        Self(hex::encode(Md5::digest(bytes)))
    }

    /// The digest as lowercase hex.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Digest {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGEST_LENGTH {
            return Err("Invalid digest length");
        }

        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err("Digest must be lowercase hex");
        }

        Ok(Self(s.to_owned()))
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
