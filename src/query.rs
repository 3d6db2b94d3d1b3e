//! Query parameters of service URLs and their canonical form.
use std::str::FromStr;

use percent_encoding::percent_decode_str;

/// Query parameter carrying the public key in signed URLs.
pub const PUBLIC_KEY_PARAM: &str = "publicKey";

/// Query parameter carrying the access token (URL signature).
pub const ACCESS_TOKEN_PARAM: &str = "accessToken";

/// Query parameter carrying the expiry of a time-limited URL, in unix seconds.
pub const EXPIRES_PARAM: &str = "expires";

/// Query parameter holding one image transformation. Repeated, order matters.
pub const TRANSFORMATION_PARAM: &str = "t[]";

/// Ordered list of query parameters.
///
/// Insertion order is kept as-is, but the canonical form used for signing
/// sorts pairs by key. The sort is stable, so values of a repeated key (such
/// as [`TRANSFORMATION_PARAM`]) keep their relative order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Create an empty set of parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Append an image transformation.
    pub fn push_transformation(&mut self, transformation: impl Into<String>) {
        self.push(TRANSFORMATION_PARAM, transformation);
    }

    /// Remove every pair with the given key, returning the removed values.
    pub fn remove(&mut self, key: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.pairs.retain(|(k, v)| {
            if k == key {
                removed.push(v.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether no pairs are present.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate over pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Canonical, encoded query string.
    ///
    /// Identical logical parameter sets yield identical output regardless of
    /// the order keys were inserted in.
    pub fn to_canonical_string(&self) -> String {
        let mut sorted: Vec<&(String, String)> = self.pairs.iter().collect();
        sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        encode_pairs(sorted.into_iter())
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn encode_pairs<'a>(pairs: impl Iterator<Item = &'a (String, String)>) -> String {
    pairs
        .map(|(k, v)| {
            // Brackets are left readable in keys such as `t[]`.
            let key = urlencoding::encode(k)
                .replace("%5B", "[")
                .replace("%5D", "]");
            format!("{}={}", key, urlencoding::encode(v))
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn decode(component: &str) -> Result<String, &'static str> {
    let plus_decoded = component.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| "Invalid percent-encoding")
}

impl FromStr for QueryParams {
    type Err = &'static str;

    fn from_str(query: &str) -> Result<Self, Self::Err> {
        let mut params = QueryParams::new();

        for pair in query.trim_start_matches('?').split('&') {
            if pair.is_empty() {
                continue;
            }

            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key.is_empty() {
                return Err("Invalid parameter");
            }
            params.push(decode(key)?, decode(value)?);
        }

        Ok(params)
    }
}

/// Renders pairs in insertion order.
impl std::fmt::Display for QueryParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&encode_pairs(self.pairs.iter()))
    }
}
