use sha2::{Digest, Sha256};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Hex-encoded SHA-256 over all `parts`, each length-prefixed so boundaries are unambiguous.
pub fn sha256_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// The first `len` hex characters of the SHA-256 of `value`.
pub fn short_digest(value: &str, len: usize) -> String {
    let mut digest = hex::encode(Sha256::digest(value.as_bytes()));
    digest.truncate(len);
    digest
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_digest() {
        let digest = short_digest("team rocket", 10);
        assert_eq!(digest.len(), 10);
        assert_eq!(digest, short_digest("team rocket", 10));
        assert_ne!(digest, short_digest("team magma", 10));
    }

    #[test]
    fn test_sha256_hex_part_boundaries() {
        assert_ne!(sha256_hex(&[b"ab", b"c"]), sha256_hex(&[b"a", b"bc"]));
        assert_eq!(sha256_hex(&[b"ab", b"c"]).len(), 64);
    }
}
