//! Store values and their JSON codec.
//!
//! Values are persisted and broadcast as JSON, so anything kept in a store
//! must round-trip through serde.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Bound satisfied by every type a store can hold.
pub trait StoreValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Serialize a value for persistence.
pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Deserialize a persisted value.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Form {
        name: String,
        age: u32,
    }

    #[test]
    fn test_encode_matches_json() {
        assert_eq!(encode(&5).unwrap(), "5");
        assert_eq!(encode(&"23").unwrap(), "\"23\"");
        assert_eq!(
            encode(&Form {
                name: "a".into(),
                age: 3
            })
            .unwrap(),
            r#"{"name":"a","age":3}"#
        );
    }

    #[test]
    fn test_decode_type_mismatch() {
        assert!(decode::<u32>("\"not a number\"").is_err());
        assert!(decode::<Form>("{").is_err());
    }
}
