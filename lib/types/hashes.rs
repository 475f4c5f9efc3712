//! Hashing for identifier derivation

pub type Hash = [u8; 32];

pub fn hash(data: &[u8]) -> Hash {
    blake3::hash(data).into()
}

/// Hash of the concatenation of `parts`
pub fn hash_parts(parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
