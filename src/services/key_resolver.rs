//! Derive an object-store key from a stored locator.
//!
//! A locator is the full address the object store returned at write time,
//! e.g. `https://bucket.s3.us-east-1.amazonaws.com/1700000000000-a%20b.txt`
//! or `local://bucket/1700000000000-a%20b.txt`. The key is the part after the
//! origin's path boundary, percent-decoded. It is recomputed on every access
//! rather than stored next to the locator.

use percent_encoding::percent_decode_str;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("location `{0}` has no object key segment")]
pub struct MalformedLocation(pub String);

pub fn resolve_key(location: &str) -> Result<String, MalformedLocation> {
    let malformed = || MalformedLocation(location.to_string());

    let (scheme, rest) = location.split_once("://").ok_or_else(malformed)?;
    if scheme.is_empty() {
        return Err(malformed());
    }

    let (authority, encoded_key) = rest.split_once('/').ok_or_else(malformed)?;
    if authority.is_empty() || encoded_key.is_empty() {
        return Err(malformed());
    }

    percent_decode_str(encoded_key)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|_| malformed())
}
