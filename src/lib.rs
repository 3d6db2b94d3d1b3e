//! # Overview
//!
//! This crate provides the authentication core of an image-storage service
//! client: content digests of images before upload, and HMAC signatures for
//! write requests and shareable URLs.
//!
//! # Signing requests and URLs
//!
//! ```rust
//! use imgstore_auth::{Credentials, PrivateKey, RequestSigner, SignedUrlBuilder, Verifier};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = Credentials::new("alice", PrivateKey::from("private-key"));
//!
//! // Signed write request.
//! let (mut parts, body) = http::Request::put("https://img.example.com/users/alice/images")
//!     .body(())?
//!     .into_parts();
//! RequestSigner::new(credentials.clone()).sign_request(&mut parts)?;
//! let _req = http::Request::from_parts(parts, body);
//!
//! // Signed URL with ordered transformations.
//! let base: Url = "https://img.example.com/".parse()?;
//! let signed_url = SignedUrlBuilder::new()
//!     .credentials(credentials)
//!     .base(base)
//!     .params()
//!     .transformation("thumbnail:width=150,height=100")
//!     .transformation("border")
//!     .path("users/alice/images/c3a5.png")
//!     .generate_signed_url()?;
//!
//! assert!(Verifier::new(PrivateKey::from("private-key")).verify_url(&signed_url));
//! # Ok(())
//! # }
//! ```
//!
//! # Digests
//!
//! ```rust,no_run
//! use imgstore_auth::digest::{DigestEngine, DigestSource};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DigestEngine::shared();
//! let digest = engine
//!     .digest(DigestSource::File("rustacean.png".into()))
//!     .await?;
//! println!("{digest}");
//! # Ok(())
//! # }
//! ```
#![warn(
    clippy::all,
    nonstandard_style,
    future_incompatible,
    missing_docs,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

pub mod canonical;
pub mod digest;
mod key;
pub mod query;
mod request;
mod service;
mod signed;

pub use key::{Credentials, KeyError, PrivateKey};
pub use request::{
    Authentication, RequestSigner, SigningConfig, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
pub use service::{BoxError, SigningLayer, SigningService};
pub use signed::{sign, SignError, Signature, SignedUrl, SignedUrlBuilder, Verifier};
