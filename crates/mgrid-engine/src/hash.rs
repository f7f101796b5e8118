use mgrid_core::{ErrorInfo, GridError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Serializes a value to canonical JSON bytes.
///
/// All engine structures keep their maps in `BTreeMap`s, so plain
/// `serde_json` output is already key-ordered and byte-stable.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, GridError> {
    serde_json::to_vec(value)
        .map_err(|err| GridError::Serde(ErrorInfo::new("json-encode", err.to_string())))
}

/// Deserializes a value from JSON bytes.
pub fn from_json_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GridError> {
    serde_json::from_slice(bytes)
        .map_err(|err| GridError::Serde(ErrorInfo::new("json-decode", err.to_string())))
}

/// Computes a stable hexadecimal hash for the provided serializable payload.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, GridError> {
    let bytes = to_canonical_json_bytes(value)?;
    let digest = Sha256::digest(bytes);
    Ok(format!("{:x}", digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_repeat_and_differ() {
        let a = stable_hash_string(&("fstar", vec![true, false])).unwrap();
        let b = stable_hash_string(&("fstar", vec![true, false])).unwrap();
        let c = stable_hash_string(&("fX", vec![true, false])).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
