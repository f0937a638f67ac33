//! Encryption envelope
//!
//! The stored form of an encrypted record. Binary fields are base64 in JSON.
//! `key` holds either the raw data key or, when `key_wrapped` is set, the data
//! key sealed under the engine's master key (nonce followed by ciphertext).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionEnvelope {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(default, with = "b64_opt")]
    pub iv: Option<Vec<u8>>,
    #[serde(default, with = "b64_opt")]
    pub key: Option<Vec<u8>>,
    #[serde(default)]
    pub key_wrapped: bool,
}

impl EncryptionEnvelope {
    /// Both halves needed to decrypt are present
    pub fn is_complete(&self) -> bool {
        self.iv.as_ref().is_some_and(|iv| !iv.is_empty())
            && self.key.as_ref().is_some_and(|key| !key.is_empty())
    }
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

mod b64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?;
        encoded
            .map(|e| STANDARD.decode(e.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_shape() {
        let envelope = EncryptionEnvelope {
            ciphertext: vec![1, 2, 3],
            iv: Some(vec![0; 12]),
            key: None,
            key_wrapped: false,
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["ciphertext"], json!("AQID"));
        assert!(value["key"].is_null());
        assert!(!envelope.is_complete());
    }

    #[test]
    fn test_missing_key_deserializes_incomplete() {
        let envelope: EncryptionEnvelope =
            serde_json::from_value(json!({ "ciphertext": "AQID", "iv": "AAAAAAAAAAAAAAAA" }))
                .unwrap();
        assert!(envelope.key.is_none());
        assert!(!envelope.is_complete());
    }
}
