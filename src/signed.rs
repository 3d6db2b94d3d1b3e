use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::{
    canonical::canonical_url,
    key::{Credentials, PrivateKey},
    query::{QueryParams, ACCESS_TOKEN_PARAM, EXPIRES_PARAM, PUBLIC_KEY_PARAM},
};

/// Errors raised while producing signed requests or URLs.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// A URL could not be parsed or joined.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// A signature or timestamp is not a valid header value.
    #[error(transparent)]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Only absolute request URIs can be signed.
    #[error("request URI must be absolute: {0}")]
    RelativeUri(String),
}

/// Hex-encoded HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    /// The signature as lowercase hex.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn mac(key: &PrivateKey) -> Hmac<Sha256> {
    Hmac::<Sha256>::new_from_slice(key.as_slice()).expect("HMAC can take key of any size")
}

/// Signs `data` with `key`.
///
/// The result is deterministic for a given key and data; any timestamp must
/// already be part of `data`.
///
/// # Example
///
/// ```rust
/// use imgstore_auth::{sign, PrivateKey};
///
/// let key = PrivateKey::from("private");
/// let signature = sign(&key, "PUT|https://img.example.com/users/alice/images|alice|2024-01-31T12:00:00Z");
/// assert_eq!(signature.as_str().len(), 64);
/// ```
pub fn sign(key: &PrivateKey, data: &str) -> Signature {
    let mut mac = mac(key);
    mac.update(data.as_bytes());
    Signature(hex::encode(mac.finalize().into_bytes()))
}

/// Verifier of signatures.
#[derive(Debug, Clone)]
pub struct Verifier {
    key: PrivateKey,
}

impl Verifier {
    /// Create a new [`Verifier`] with the provided [`PrivateKey`].
    pub const fn new(key: PrivateKey) -> Self {
        Self { key }
    }

    /// Verify a given hex signature and value.
    ///
    /// # Example
    ///
    /// ```rust
    /// use imgstore_auth::{sign, PrivateKey, Verifier};
    ///
    /// let key = PrivateKey::from("private");
    /// let signature = sign(&key, "foobar");
    ///
    /// let verifier = Verifier::new(key);
    /// assert!(verifier.verify(signature.as_str(), "foobar"));
    /// assert!(!verifier.verify(signature.as_str(), "foobaz"));
    /// ```
    pub fn verify(&self, signature: &str, value: &str) -> bool {
        let Ok(digest) = hex::decode(signature) else {
            tracing::warn!("could not hex decode signature");
            return false;
        };

        let mut mac = mac(&self.key);
        mac.update(value.as_bytes());
        mac.verify_slice(&digest).is_ok()
    }

    /// Verify a URL produced by [`SignedUrl::generate_signed_url`] against the
    /// current time.
    pub fn verify_url(&self, url: &Url) -> bool {
        self.verify_url_at(url, Utc::now())
    }

    /// Verify a signed URL as of `now`.
    ///
    /// The URL must carry exactly one access token, and if it carries an
    /// expiry, `now` must not be past it.
    pub fn verify_url_at(&self, url: &Url, now: DateTime<Utc>) -> bool {
        let mut params: QueryParams = url.query_pairs().collect();
        let tokens = params.remove(ACCESS_TOKEN_PARAM);
        let [token] = tokens.as_slice() else {
            tracing::warn!(url = %url, tokens = tokens.len(), "expected exactly one access token");
            return false;
        };

        if let Some(expires) = params.get(EXPIRES_PARAM) {
            let Ok(expires) = expires.parse::<i64>() else {
                tracing::warn!(url = %url, "invalid expiry");
                return false;
            };

            if now.timestamp() > expires {
                tracing::warn!(url = %url, expires, "signed URL has expired");
                return false;
            }
        }

        let mut unsigned = url.clone();
        if params.is_empty() {
            unsigned.set_query(None);
        } else {
            unsigned.set_query(Some(&params.to_canonical_string()));
        }

        self.verify(token, &canonical_url(&unsigned))
    }
}

/// Signed URL.
#[derive(Debug)]
pub struct SignedUrl {
    base: Url,
    credentials: Credentials,
    params: QueryParams,
    path: String,
}

impl SignedUrl {
    const fn new(credentials: Credentials, base: Url, path: String, params: QueryParams) -> Self {
        Self {
            base,
            credentials,
            params,
            path,
        }
    }

    /// Generates a signed URL.
    ///
    /// The public key is added to the query, the query is put in canonical
    /// order, and the access token is the signature of the resulting URL.
    #[tracing::instrument(skip_all, fields(path = %self.path), err)]
    pub fn generate_signed_url(&self) -> Result<Url, SignError> {
        let mut url = self.base.join(&self.path)?;

        let mut params: QueryParams = url.query_pairs().collect();
        for (key, value) in self.params.iter() {
            params.push(key, value);
        }
        params.remove(ACCESS_TOKEN_PARAM);
        params.remove(PUBLIC_KEY_PARAM);
        params.push(PUBLIC_KEY_PARAM, self.credentials.public_key.as_str());

        url.set_fragment(None);
        url.set_query(Some(&params.to_canonical_string()));

        let token = sign(&self.credentials.private_key, &canonical_url(&url));
        url.query_pairs_mut()
            .append_pair(ACCESS_TOKEN_PARAM, token.as_str());

        Ok(url)
    }
}

/// Builder for [`SignedUrl`].
#[derive(Debug)]
pub struct SignedUrlBuilder<C, B, P> {
    credentials: C,
    base: B,
    params: P,
}

impl SignedUrlBuilder<(), (), ()> {
    /// Create a new [`SignedUrlBuilder`].
    pub const fn new() -> Self {
        Self {
            credentials: (),
            base: (),
            params: (),
        }
    }

    /// Set signing credentials.
    pub fn credentials(self, credentials: Credentials) -> SignedUrlBuilder<Credentials, (), ()> {
        SignedUrlBuilder {
            credentials,
            base: (),
            params: (),
        }
    }
}

impl SignedUrlBuilder<Credentials, (), ()> {
    /// Set base URL of the service.
    pub fn base(self, base: Url) -> SignedUrlBuilder<Credentials, Url, ()> {
        SignedUrlBuilder {
            credentials: self.credentials,
            base,
            params: (),
        }
    }
}

impl SignedUrlBuilder<Credentials, Url, ()> {
    /// Returns a builder on which parameters may be set.
    pub fn params(self) -> SignedUrlBuilder<Credentials, Url, QueryParams> {
        SignedUrlBuilder {
            credentials: self.credentials,
            base: self.base,
            params: QueryParams::default(),
        }
    }
}

impl SignedUrlBuilder<Credentials, Url, QueryParams> {
    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push(key, value);
        self
    }

    /// Add an image transformation; transformations apply in the order added.
    pub fn transformation(mut self, transformation: impl Into<String>) -> Self {
        self.params.push_transformation(transformation);
        self
    }

    /// Make the URL valid only until `expires`.
    pub fn expires_at(mut self, expires: DateTime<Utc>) -> Self {
        self.params.remove(EXPIRES_PARAM);
        self.params.push(EXPIRES_PARAM, expires.timestamp().to_string());
        self
    }

    /// Set resource path, relative to the base URL, and finish.
    pub fn path(self, path: impl Into<String>) -> SignedUrl {
        SignedUrl::new(self.credentials, self.base, path.into(), self.params)
    }
}

impl Default for SignedUrlBuilder<(), (), ()> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    use super::*;

    fn credentials() -> Credentials {
        Credentials::new("alice", PrivateKey::from("private-key"))
    }

    fn base() -> Url {
        "https://img.example.com/".parse().unwrap()
    }

    #[test]
    fn sign_is_deterministic() {
        let key = PrivateKey::from("key");
        assert_eq!(sign(&key, "message"), sign(&key, "message"));
    }

    #[test]
    fn sign_changes_with_key_or_message() {
        let a = sign(&PrivateKey::from("key"), "message");
        let b = sign(&PrivateKey::from("key2"), "message");
        let c = sign(&PrivateKey::from("key"), "message2");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn sign_matches_rfc4231_vector() {
        // RFC 4231, test case 2.
        let signature = sign(
            &PrivateKey::from("Jefe"),
            "what do ya want for nothing?",
        );
        assert_eq!(
            signature.as_str(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verify_rejects_garbage() {
        let verifier = Verifier::new(PrivateKey::from("key"));
        assert!(!verifier.verify("not-hex", "value"));
        assert!(!verifier.verify("abcd", "value"));
    }

    #[test]
    fn signed_url_carries_public_key_and_token() {
        let url = SignedUrlBuilder::new()
            .credentials(credentials())
            .base(base())
            .params()
            .transformation("thumbnail")
            .path("users/alice/images/abc.png")
            .generate_signed_url()
            .unwrap();

        assert_eq!(url.path(), "/users/alice/images/abc.png");
        let params: QueryParams = url.query_pairs().collect();
        assert_eq!(params.get(PUBLIC_KEY_PARAM), Some("alice"));
        assert_eq!(params.get(ACCESS_TOKEN_PARAM).map(str::len), Some(64));
        assert!(!url.as_str().contains("private-key"));
    }

    #[test]
    fn signed_url_verifies() {
        let url = SignedUrlBuilder::new()
            .credentials(credentials())
            .base(base())
            .params()
            .query("page", "1")
            .transformation("crop:x=0,y=0,width=10,height=10")
            .transformation("border")
            .path("users/alice/images/abc.png")
            .generate_signed_url()
            .unwrap();

        let verifier = Verifier::new(PrivateKey::from("private-key"));
        assert!(verifier.verify_url(&url));

        let other = Verifier::new(PrivateKey::from("other-key"));
        assert!(!other.verify_url(&url));
    }

    #[test]
    fn signed_url_is_independent_of_param_order() {
        let a = SignedUrlBuilder::new()
            .credentials(credentials())
            .base(base())
            .params()
            .query("limit", "5")
            .query("page", "1")
            .path("users/alice/images")
            .generate_signed_url()
            .unwrap();
        let b = SignedUrlBuilder::new()
            .credentials(credentials())
            .base(base())
            .params()
            .query("page", "1")
            .query("limit", "5")
            .path("users/alice/images")
            .generate_signed_url()
            .unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn tampered_url_fails() {
        let url = SignedUrlBuilder::new()
            .credentials(credentials())
            .base(base())
            .params()
            .transformation("thumbnail")
            .transformation("sepia")
            .path("users/alice/images/abc.png")
            .generate_signed_url()
            .unwrap();

        let verifier = Verifier::new(PrivateKey::from("private-key"));

        // Swapping transformation order changes the meaning and the signature.
        let swapped: Url = url
            .as_str()
            .replace("thumbnail", "TMP")
            .replace("sepia", "thumbnail")
            .replace("TMP", "sepia")
            .parse()
            .unwrap();
        assert!(!verifier.verify_url(&swapped));

        let mut stripped = url.clone();
        stripped.set_query(Some("publicKey=alice"));
        assert!(!verifier.verify_url(&stripped));
    }

    #[test]
    fn expired_url_fails() {
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        let url = SignedUrlBuilder::new()
            .credentials(credentials())
            .base(base())
            .params()
            .expires_at(now + Duration::minutes(5))
            .path("users/alice/images/abc.png")
            .generate_signed_url()
            .unwrap();

        let verifier = Verifier::new(PrivateKey::from("private-key"));
        assert!(verifier.verify_url_at(&url, now));
        assert!(verifier.verify_url_at(&url, now + Duration::minutes(5)));
        assert!(!verifier.verify_url_at(&url, now + Duration::minutes(6)));
    }
}
