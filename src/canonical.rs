//! Canonical strings fed to the MAC.
//!
//! Both the signer and the image-storage service build these strings from the
//! same logical inputs, so every field has a fixed position and separator.
use chrono::{DateTime, SecondsFormat, Utc};
use http::Method;
use url::Url;

use crate::query::QueryParams;

const FIELD_SEPARATOR: char = '|';

/// Formats a timestamp the way the service expects: `2024-01-31T12:00:00Z`.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Canonical form of `url`: everything up to the path as-is, then the query in
/// canonical order. Fragments are dropped.
pub fn canonical_url(url: &Url) -> String {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);

    let params: QueryParams = url.query_pairs().collect();
    if params.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, params.to_canonical_string())
    }
}

/// Inputs of a signed write request, in the order they are serialized.
#[derive(Debug, Clone)]
pub struct CanonicalRequest<'a> {
    /// HTTP method.
    pub method: &'a Method,
    /// Full request URL, including query.
    pub url: &'a Url,
    /// Public key of the signing user.
    pub public_key: &'a str,
    /// Request time.
    pub timestamp: DateTime<Utc>,
}

impl std::fmt::Display for CanonicalRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields = [
            self.method.as_str().to_owned(),
            canonical_url(self.url),
            self.public_key.to_owned(),
            format_timestamp(self.timestamp),
        ];

        let mut fields_iter = fields.iter();
        if let Some(first) = fields_iter.next() {
            write!(f, "{first}")?;
            for field in fields_iter {
                write!(f, "{FIELD_SEPARATOR}{field}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap()
    }

    #[test]
    fn timestamp_format() {
        assert_eq!(format_timestamp(at_noon()), "2024-01-31T12:00:00Z");
    }

    #[test]
    fn canonical_url_sorts_query() {
        let a: Url = "https://img.example.com/users/alice/images?page=2&limit=10#x"
            .parse()
            .unwrap();
        let b: Url = "https://img.example.com/users/alice/images?limit=10&page=2"
            .parse()
            .unwrap();

        assert_eq!(canonical_url(&a), canonical_url(&b));
        assert_eq!(
            canonical_url(&a),
            "https://img.example.com/users/alice/images?limit=10&page=2"
        );
    }

    #[test]
    fn canonical_url_without_query() {
        let url: Url = "http://localhost:8080/users/alice/images".parse().unwrap();
        assert_eq!(canonical_url(&url), "http://localhost:8080/users/alice/images");
    }

    #[test]
    fn request_fields_in_fixed_order() {
        let url: Url = "https://img.example.com/users/alice/images".parse().unwrap();
        let canonical = CanonicalRequest {
            method: &Method::PUT,
            url: &url,
            public_key: "alice",
            timestamp: at_noon(),
        };

        assert_eq!(
            canonical.to_string(),
            "PUT|https://img.example.com/users/alice/images|alice|2024-01-31T12:00:00Z"
        );
    }
}
