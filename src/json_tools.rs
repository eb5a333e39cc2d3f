use onlyerror::Error;
use serde_json::Value;
use std::{fmt::Display, str::FromStr};

#[derive(Error, Debug)]
pub enum Error {
    /// Error converting JSON Value to str
    #[error("Object key `{0}` was expected to be type `{1}`")]
    UnexpectedJsonType(String, ExpectedType),

    /// Missing object key
    #[error("Object key `{0}` does not exist")]
    JsonMissingElement(String),

    /// Expected a JSON string
    ExpectedJsonStr,

    /// Error with key operations
    Key(#[from] crate::key::Error),

    /// DID Encoding error
    DidEncoding(#[from] crate::identifier::Error),

    /// Verification Error
    Verification(#[from] crate::verification::Error),

    /// Document service endpoints error
    Service(#[from] crate::service::Error),

    /// This should not happen: Only needed to satisfy `String: FromStr` trait bound
    Infallible(#[from] std::convert::Infallible),
}

#[derive(Debug)]
pub enum ExpectedType {
    Number,
    String,
    Array,
}

impl Display for ExpectedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpectedType::Number => write!(f, "Number"),
            ExpectedType::String => write!(f, "String"),
            ExpectedType::Array => write!(f, "Array"),
        }
    }
}

/// Returns value[key] as a str if it is a JSON string.
pub(crate) fn string_from_object<'value>(
    value: &'value Value,
    key: &str,
) -> Result<&'value str, Error> {
    optional_string_from_object(value, key)?.ok_or_else(|| Error::JsonMissingElement(key.into()))
}

/// Returns value[key] as a str if it is a JSON string, or `None` if the key is missing.
pub(crate) fn optional_string_from_object<'value>(
    value: &'value Value,
    key: &str,
) -> Result<Option<&'value str>, Error> {
    let obj = &value[key];

    if obj.is_null() {
        Ok(None)
    } else {
        obj.as_str()
            .map(Option::Some)
            .ok_or_else(|| Error::UnexpectedJsonType(key.into(), ExpectedType::String))
    }
}

/// Returns value[key] as an unsigned int if it is a non-negative JSON integer.
pub(crate) fn u64_from_object(value: &Value, key: &str) -> Result<u64, Error> {
    let obj = &value[key];

    if obj.is_null() {
        Err(Error::JsonMissingElement(key.into()))
    } else {
        obj.as_u64()
            .ok_or_else(|| Error::UnexpectedJsonType(key.into(), ExpectedType::Number))
    }
}

/// Create a vector of any type from `value[key]` using a map function.
pub(crate) fn vec_from_object<T, F>(value: &Value, key: &str, map_fn: F) -> Result<Vec<T>, Error>
where
    F: Fn(&Value) -> Result<T, Error>,
{
    let obj = &value[key];

    if obj.is_null() {
        Ok(Vec::new())
    } else {
        obj.as_array()
            .ok_or_else(|| Error::UnexpectedJsonType(key.into(), ExpectedType::Array))?
            .iter()
            .map(map_fn)
            .collect::<Result<Vec<_>, Error>>()
    }
}

/// Returns `value[key]` as a list of strings, accepting either a single string or an array.
pub(crate) fn strings_from_object(value: &Value, key: &str) -> Result<Vec<String>, Error> {
    match &value[key] {
        Value::String(s) => Ok(vec![s.clone()]),
        _ => vec_from_object(value, key, |s| string_from_value(s).map(String::from)),
    }
}

/// Returns a string if the JSON value is a string type.
pub(crate) fn string_from_value(value: &Value) -> Result<&str, Error> {
    value.as_str().ok_or(Error::ExpectedJsonStr)
}

/// Create a vector of any type from `value[key]` if it can be parsed from a string.
pub(crate) fn vec_from_value<T>(value: &Value, key: &str) -> Result<Vec<T>, Error>
where
    T: FromStr,
    Error: From<<T as FromStr>::Err>,
{
    vec_from_object(value, key, |v| Ok(string_from_value(v)?.parse()?))
}
