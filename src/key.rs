// Adapted from: https://github.com/rwf2/cookie-rs/blob/ba46fc5e97a1271435f38509d109e125a473bc82/src/secure/key.rs
use std::convert::TryFrom;

/// Environment variable holding the public key.
pub const PUBLIC_KEY_ENV: &str = "IMGSTORE_PUBLIC_KEY";

/// Environment variable holding the private key.
pub const PRIVATE_KEY_ENV: &str = "IMGSTORE_PRIVATE_KEY";

/// Private key used as the HMAC key when signing requests and URLs.
///
/// The key is an opaque secret handed out by the image-storage service. It is
/// never written into a canonical string and never transmitted.
#[derive(Clone)]
pub struct PrivateKey(Box<[u8]>);

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;

        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PrivateKey {}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey").finish()
    }
}

impl PrivateKey {
    /// Creates a new `PrivateKey` from the secret issued by the service.
    ///
    /// # Panics
    ///
    /// Panics if `key` is empty. For a non-panicking version, use
    /// [`PrivateKey::try_from()`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use imgstore_auth::PrivateKey;
    ///
    /// let key = PrivateKey::from("my-private-key");
    /// ```
    #[inline]
    pub fn from(key: &str) -> PrivateKey {
        PrivateKey::try_from(key).unwrap()
    }

    /// Returns the key as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

/// Errors raised while building keys.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KeyError {
    /// No key material was provided.
    #[error("key material is empty")]
    Empty,

    /// A required environment variable is not set.
    #[error("environment variable `{0}` is not set")]
    MissingEnv(&'static str),
}

impl TryFrom<&str> for PrivateKey {
    type Error = KeyError;

    /// A fallible version of [`PrivateKey::from()`].
    ///
    /// # Example
    ///
    /// ```rust
    /// # use std::convert::TryFrom;
    /// use imgstore_auth::PrivateKey;
    ///
    /// assert!(PrivateKey::try_from("secret").is_ok());
    /// assert!(PrivateKey::try_from("").is_err());
    /// ```
    fn try_from(key: &str) -> Result<Self, Self::Error> {
        if key.is_empty() {
            Err(KeyError::Empty)
        } else {
            Ok(PrivateKey(key.as_bytes().into()))
        }
    }
}

/// Public/private key pair identifying a user of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Public key (user), sent in clear with every signed request.
    pub public_key: String,

    /// Private key, used only as the MAC key.
    pub private_key: PrivateKey,
}

impl Credentials {
    /// Create a new pair of [`Credentials`].
    pub fn new(public_key: impl Into<String>, private_key: PrivateKey) -> Self {
        Self {
            public_key: public_key.into(),
            private_key,
        }
    }

    /// Load credentials from `IMGSTORE_PUBLIC_KEY` and `IMGSTORE_PRIVATE_KEY`.
    pub fn from_env() -> Result<Self, KeyError> {
        let public_key =
            std::env::var(PUBLIC_KEY_ENV).map_err(|_| KeyError::MissingEnv(PUBLIC_KEY_ENV))?;
        let private_key =
            std::env::var(PRIVATE_KEY_ENV).map_err(|_| KeyError::MissingEnv(PRIVATE_KEY_ENV))?;

        if public_key.is_empty() {
            return Err(KeyError::Empty);
        }

        let private_key = PrivateKey::try_from(private_key.as_str())?;
        tracing::debug!(public_key = %public_key, "loaded credentials from environment");

        Ok(Self::new(public_key, private_key))
    }
}
