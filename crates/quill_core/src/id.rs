//! Document identifier generation.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of a document id.
pub const DOC_ID_LEN: usize = 16;

/// Generates a random document id.
///
/// Ids are 16-character opaque alphanumeric strings. Collisions are
/// possible but vanishingly rare; the store retries against its `_id`
/// index until the id is free.
#[must_use]
pub fn random_doc_id() -> String {
    random_string(DOC_ID_LEN)
}

/// Generates a random alphanumeric string of the given length.
///
/// Also used by the serialization-hook self-test battery.
#[must_use]
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_expected_length() {
        assert_eq!(random_doc_id().len(), DOC_ID_LEN);
    }

    #[test]
    fn is_alphanumeric() {
        assert!(random_doc_id().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn two_ids_differ() {
        assert_ne!(random_doc_id(), random_doc_id());
    }

    #[test]
    fn arbitrary_lengths() {
        for len in [0, 1, 7, 29] {
            assert_eq!(random_string(len).len(), len);
        }
    }
}
