//! Content hashing and deterministic hash-ordering.

use commonware_cryptography::{Hasher, Sha256};

/// Length of every digest produced by [hash].
pub const DIGEST_LENGTH: usize = 32;

/// Hash the concatenation of `parts`.
pub fn hash(parts: &[&[u8]]) -> [u8; DIGEST_LENGTH] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; DIGEST_LENGTH];
    out.copy_from_slice(digest.as_ref());
    out
}

/// An item that can be ordered by [hash_sort].
pub trait HashSortable {
    /// Bytes that identify the item.
    fn sort_key(&self) -> &[u8];
}

/// Sort `items` by `hash(sort_key || entropy)`.
///
/// Without entropy, items are sorted by their raw sort keys. With entropy,
/// the order is unpredictable before the entropy is known but identical on
/// every node that knows it.
pub fn hash_sort<T: HashSortable>(items: Vec<T>, entropy: Option<&[u8]>) -> Vec<T> {
    let mut keyed: Vec<(Vec<u8>, T)> = items
        .into_iter()
        .map(|item| {
            let key = match entropy {
                Some(entropy) => hash(&[item.sort_key(), entropy]).to_vec(),
                None => item.sort_key().to_vec(),
            };
            (key, item)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
    keyed.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Key(Vec<u8>);

    impl HashSortable for Key {
        fn sort_key(&self) -> &[u8] {
            &self.0
        }
    }

    #[test]
    fn test_hash_concatenation() {
        assert_eq!(hash(&[b"ab", b"c"]), hash(&[b"abc"]));
        assert_ne!(hash(&[b"abc"]), hash(&[b"abd"]));
    }

    #[test]
    fn test_hash_sort_without_entropy() {
        let items = vec![Key(vec![3]), Key(vec![1]), Key(vec![2])];
        let sorted = hash_sort(items, None);
        let keys: Vec<u8> = sorted.iter().map(|k| k.0[0]).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn test_hash_sort_with_entropy() {
        let entropy = b"entropy";
        let items: Vec<Key> = (0..16u8).map(|i| Key(vec![i])).collect();
        let sorted = hash_sort(items, Some(entropy));

        // Order is defined by the hashed keys
        let hashes: Vec<[u8; DIGEST_LENGTH]> = sorted
            .iter()
            .map(|k| hash(&[&k.0, entropy]))
            .collect();
        assert!(hashes.windows(2).all(|w| w[0] <= w[1]));

        // Same input always yields the same order
        let again = hash_sort((0..16u8).map(|i| Key(vec![i])).collect(), Some(entropy));
        let first: Vec<u8> = sorted.iter().map(|k| k.0[0]).collect();
        let second: Vec<u8> = again.iter().map(|k| k.0[0]).collect();
        assert_eq!(first, second);
    }
}
