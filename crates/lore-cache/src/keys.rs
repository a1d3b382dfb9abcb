//! Cache key generation.
//!
//! Keys are content-addressed: stable SHA-256 digests over normalized note
//! content and normalized context inputs, so permuted player-character name
//! lists and cosmetic markdown/whitespace edits collide onto the same entry.
//!
//! The hash functions are pure and version-agnostic; the algorithm version
//! is supplied by the caller and stored alongside the hash in the cache
//! entry, not folded into it.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use lore_core::{AiCacheKey, CacheType};

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalize note text for hashing: lowercase, strip markdown emphasis
/// markers, collapse whitespace, trim.
pub fn normalize_content(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '~' | '`'))
        .collect();
    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Content hash over a note's title and content.
pub fn content_hash(title: &str, content: &str) -> String {
    let input = format!(
        "{}\u{0000}{}",
        normalize_content(title),
        normalize_content(content)
    );
    sha256_hex(&input)
}

/// Context hash over player-character names: order-independent and
/// duplicate-insensitive.
pub fn context_hash<S: AsRef<str>>(pc_names: &[S]) -> String {
    let mut names: Vec<String> = pc_names
        .iter()
        .map(|n| n.as_ref().to_lowercase())
        .collect();
    names.sort();
    names.dedup();
    sha256_hex(&names.join("\u{0000}"))
}

/// Symmetric pair hash for relationship entries: the two content hashes are
/// sorted lexicographically before concatenation, so
/// `pair_hash(a, b) == pair_hash(b, a)`.
pub fn relationship_pair_hash(content_hash_a: &str, content_hash_b: &str) -> String {
    let (lo, hi) = if content_hash_a <= content_hash_b {
        (content_hash_a, content_hash_b)
    } else {
        (content_hash_b, content_hash_a)
    };
    sha256_hex(&format!("{}{}", lo, hi))
}

/// Build the full classification lookup key for a note.
pub fn classification_cache_key(
    title: &str,
    content: &str,
    pc_names: &[String],
    team_id: Uuid,
    algorithm_version: &str,
) -> AiCacheKey {
    AiCacheKey {
        cache_type: CacheType::Classification,
        content_hash: content_hash(title, content),
        algorithm_version: algorithm_version.to_string(),
        context_hash: context_hash(pc_names),
        team_id,
    }
}

/// Build the full relationship lookup key for an unordered note pair.
pub fn relationship_cache_key(
    content_hash_a: &str,
    content_hash_b: &str,
    team_id: Uuid,
    algorithm_version: &str,
) -> AiCacheKey {
    AiCacheKey {
        cache_type: CacheType::Relationship,
        content_hash: relationship_pair_hash(content_hash_a, content_hash_b),
        algorithm_version: algorithm_version.to_string(),
        context_hash: context_hash::<&str>(&[]),
        team_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_content_strips_emphasis_and_whitespace() {
        assert_eq!(
            normalize_content("The  **Mayor** of\n_Thistle Hollow_  "),
            "the mayor of thistle hollow"
        );
    }

    #[test]
    fn test_content_hash_invariant_under_cosmetic_edits() {
        let base = content_hash("Mayor Hobbs", "A **stern** man.");
        assert_eq!(base, content_hash("Mayor Hobbs", "a stern   man."));
        assert_eq!(base, content_hash("mayor hobbs", "A stern man."));
    }

    #[test]
    fn test_content_hash_changes_with_substance() {
        let base = content_hash("Mayor Hobbs", "A stern man.");
        assert_ne!(base, content_hash("Mayor Hobbs", "A kind man."));
        assert_ne!(base, content_hash("Old Wren", "A stern man."));
    }

    #[test]
    fn test_content_hash_separates_title_and_content() {
        // The NUL separator keeps (title, content) splits distinct.
        assert_ne!(content_hash("ab", "c"), content_hash("a", "bc"));
    }

    #[test]
    fn test_context_hash_permutation_invariant() {
        let a = context_hash(&["Wren", "Maeve", "Hobbs"]);
        let b = context_hash(&["hobbs", "wren", "maeve"]);
        let c = context_hash(&["Wren", "Wren", "Maeve", "Hobbs"]);
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_context_hash_changes_with_members() {
        assert_ne!(context_hash(&["Wren"]), context_hash(&["Wren", "Maeve"]));
    }

    #[test]
    fn test_relationship_pair_hash_symmetric() {
        let a = content_hash("A", "alpha");
        let b = content_hash("B", "beta");
        assert_eq!(relationship_pair_hash(&a, &b), relationship_pair_hash(&b, &a));
        assert_ne!(
            relationship_pair_hash(&a, &b),
            relationship_pair_hash(&a, &a)
        );
    }

    #[test]
    fn test_keys_carry_version_without_folding_into_hash() {
        let team = Uuid::new_v4();
        let v1 = classification_cache_key("T", "c", &[], team, "v1");
        let v2 = classification_cache_key("T", "c", &[], team, "v2");
        assert_eq!(v1.content_hash, v2.content_hash);
        assert_ne!(v1.algorithm_version, v2.algorithm_version);
        assert_ne!(v1, v2);
    }
}
