use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::instrument;
use url::Url;

use super::DigestError;

/// What to hash: raw bytes, or a reference that must be resolved to bytes
/// first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestSource {
    /// Raw bytes, hashed as-is.
    Binary(Bytes),

    /// Local file to read.
    File(PathBuf),

    /// Remote URL to fetch. Parsed when resolved.
    Url(String),
}

/// Kind of delegation descriptor held in raw caller data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// The data is a UTF-8 file path.
    File,

    /// The data is a UTF-8 URL.
    Url,
}

/// How to interpret data handed to [`DigestSource::from_data`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestOptions {
    /// Treat the data as a descriptor of this kind.
    pub source: Option<SourceKind>,

    /// Treat the data as raw bytes, skipping descriptor detection.
    pub binary: bool,
}

impl DigestSource {
    /// Interpret caller data according to `options`.
    ///
    /// `binary` wins over `source`; with neither set the data is raw bytes.
    /// URLs are trimmed of surrounding whitespace, file paths are taken as-is.
    pub fn from_data(data: Bytes, options: DigestOptions) -> Result<Self, DigestError> {
        if options.binary {
            return Ok(Self::Binary(data));
        }

        let Some(kind) = options.source else {
            return Ok(Self::Binary(data));
        };

        let descriptor = std::str::from_utf8(&data)
            .map_err(|err| DigestError::InvalidSource(err.to_string()))?;

        Ok(match kind {
            SourceKind::File => Self::File(descriptor.into()),
            SourceKind::Url => Self::Url(descriptor.trim().to_owned()),
        })
    }
}

impl From<Bytes> for DigestSource {
    fn from(bytes: Bytes) -> Self {
        Self::Binary(bytes)
    }
}

impl From<Vec<u8>> for DigestSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes.into())
    }
}

impl From<&'static [u8]> for DigestSource {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Binary(Bytes::from_static(bytes))
    }
}

impl From<Url> for DigestSource {
    fn from(url: Url) -> Self {
        Self::Url(url.into())
    }
}

/// Resolves delegation descriptors into raw bytes.
#[async_trait]
pub trait SourceReader: std::fmt::Debug + Send + Sync + 'static {
    /// Load the bytes behind `source`.
    async fn resolve(&self, source: &DigestSource) -> Result<Bytes, DigestError>;
}

/// Default [`SourceReader`], reading files with `tokio::fs` and URLs with
/// `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpSourceReader {
    client: reqwest::Client,
}

impl HttpSourceReader {
    /// Create a new [`HttpSourceReader`] using `client` for URL sources.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &str) -> Result<Bytes, DigestError> {
        let url: Url = url
            .parse()
            .map_err(|err: url::ParseError| DigestError::InvalidSource(err.to_string()))?;

        let res = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| DigestError::Fetch {
                url: url.clone(),
                source,
            })?;

        res.bytes()
            .await
            .map_err(|source| DigestError::Fetch { url, source })
    }
}

#[async_trait]
impl SourceReader for HttpSourceReader {
    #[instrument(skip_all, err)]
    async fn resolve(&self, source: &DigestSource) -> Result<Bytes, DigestError> {
        match source {
            DigestSource::Binary(bytes) => Ok(bytes.clone()),

            DigestSource::File(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|source| DigestError::ReadFile {
                    path: path.clone(),
                    source,
                }),

            DigestSource::Url(url) => self.fetch(url).await,
        }
    }
}
