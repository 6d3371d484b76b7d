//! Integrity hashing for deltas: payload checksum and operation Merkle root.

/// blake3 checksum over a (compressed) payload, hex-encoded.
pub fn checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Binary Merkle root over hex leaf hashes.
///
/// Odd nodes at any level are promoted unchanged. The root of an empty list
/// is the hash of the empty input.
pub fn merkle_root(leaves: &[String]) -> String {
    if leaves.is_empty() {
        return checksum(b"");
    }
    let mut level: Vec<String> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                if pair.len() == 2 {
                    let mut hasher = blake3::Hasher::new();
                    hasher.update(pair[0].as_bytes());
                    hasher.update(pair[1].as_bytes());
                    hasher.finalize().to_hex().to_string()
                } else {
                    pair[0].clone()
                }
            })
            .collect();
    }
    level.swap_remove(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_is_its_own_root() {
        let leaf = checksum(b"op");
        assert_eq!(merkle_root(&[leaf.clone()]), leaf);
    }

    #[test]
    fn leaf_order_changes_root() {
        let a = checksum(b"a");
        let b = checksum(b"b");
        assert_ne!(
            merkle_root(&[a.clone(), b.clone()]),
            merkle_root(&[b, a])
        );
    }

    #[test]
    fn odd_leaf_count_is_stable() {
        let leaves: Vec<String> = ["a", "b", "c"].iter().map(|s| checksum(s.as_bytes())).collect();
        assert_eq!(merkle_root(&leaves), merkle_root(&leaves));
    }
}
