//! Deterministic byte serializations of JSON documents.
//!
//! Two algorithms are supported: the JSON Canonicalization Scheme (RFC 8785) and RDF Dataset
//! Canonicalization (RDFC-1.0) over a direct JSON to RDF mapping (see [`rdfc`]).

use onlyerror::Error;
use serde_json::Value;

pub mod rdfc;

#[derive(Error, Debug)]
pub enum Error {
    /// Document root must be a JSON object
    NotAnObject,

    /// JCS serialization failed
    Jcs(#[from] serde_json::Error),

    /// Document could not be mapped to an RDF dataset
    #[error("RDF mapping failed: {0}")]
    RdfMapping(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Canonicalization {
    #[default]
    Jcs,
    Rdfc,
}

/// Canonicalize `document` with the selected algorithm.
pub fn canonicalize(document: &Value, algorithm: Canonicalization) -> Result<String, Error> {
    match algorithm {
        Canonicalization::Jcs => Ok(serde_jcs::to_string(document)?),
        Canonicalization::Rdfc => rdfc::canonicalize(document),
    }
}

/// JCS for values that are already valid JSON.
pub(crate) fn jcs(document: &Value) -> String {
    serde_jcs::to_string(document).expect("JSON values always serialize to JCS")
}
