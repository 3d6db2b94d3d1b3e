use chrono::{DateTime, Utc};
use http::{header::HeaderName, HeaderValue, Method};
use url::Url;

use crate::{
    canonical::{format_timestamp, CanonicalRequest},
    key::Credentials,
    signed::{sign, SignError, Signature},
};

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-imbo-authenticate-signature";

/// Header carrying the signing timestamp.
pub const TIMESTAMP_HEADER: &str = "x-imbo-authenticate-timestamp";

/// Which requests get signed, and where the signature goes.
#[derive(Debug, Clone)]
pub struct SigningConfig {
    /// Header receiving the signature.
    pub signature_header: HeaderName,

    /// Header receiving the timestamp that was signed.
    pub timestamp_header: HeaderName,

    /// Methods requiring a signature. Reads are authorized by access token.
    pub signed_methods: Vec<Method>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            signature_header: HeaderName::from_static(SIGNATURE_HEADER),
            timestamp_header: HeaderName::from_static(TIMESTAMP_HEADER),
            signed_methods: vec![Method::POST, Method::PUT, Method::PATCH, Method::DELETE],
        }
    }
}

impl SigningConfig {
    /// Whether requests with `method` must be signed.
    pub fn requires_signature(&self, method: &Method) -> bool {
        self.signed_methods.contains(method)
    }
}

/// Signature and the timestamp it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    /// Hex HMAC over the canonical request.
    pub signature: Signature,

    /// Formatted timestamp included in the canonical request.
    pub timestamp: String,
}

/// Signs write requests with the user's credentials.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Credentials,
    config: SigningConfig,
    time: Option<DateTime<Utc>>,
}

impl RequestSigner {
    /// Create a new signer using the default [`SigningConfig`].
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            config: SigningConfig::default(),
            time: None,
        }
    }

    /// Configure header names and signed methods.
    pub fn set_config(self, config: SigningConfig) -> Self {
        Self { config, ..self }
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// Requests should always be signed with the current time. Only use this
    /// for testing.
    pub fn with_time(self, time: DateTime<Utc>) -> Self {
        Self {
            time: Some(time),
            ..self
        }
    }

    /// Signing configuration.
    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    fn get_time(&self) -> DateTime<Utc> {
        self.time.unwrap_or_else(Utc::now)
    }

    /// Compute the signature for `method` on `url`.
    pub fn authenticate(&self, method: &Method, url: &Url) -> Authentication {
        let timestamp = self.get_time();
        let canonical = CanonicalRequest {
            method,
            url,
            public_key: &self.credentials.public_key,
            timestamp,
        };

        Authentication {
            signature: sign(&self.credentials.private_key, &canonical.to_string()),
            timestamp: format_timestamp(timestamp),
        }
    }

    /// Sign request parts in place by inserting the signature and timestamp
    /// headers.
    #[tracing::instrument(skip_all, fields(method = %req.method, uri = %req.uri), err)]
    pub fn sign_request(&self, req: &mut http::request::Parts) -> Result<(), SignError> {
        let uri = req.uri.to_string();
        if req.uri.scheme().is_none() || req.uri.authority().is_none() {
            return Err(SignError::RelativeUri(uri));
        }

        let url: Url = uri.parse()?;
        let Authentication {
            signature,
            timestamp,
        } = self.authenticate(&req.method, &url);

        let mut signature_value = HeaderValue::from_str(signature.as_str())?;
        signature_value.set_sensitive(true);
        req.headers
            .insert(self.config.signature_header.clone(), signature_value);
        req.headers.insert(
            self.config.timestamp_header.clone(),
            HeaderValue::from_str(&timestamp)?,
        );

        tracing::debug!(timestamp = %timestamp, "signed request");

        Ok(())
    }
}
