use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generates a unique batch id for one pipeline run.
///
/// Timestamp-prefixed so ledger rows sort chronologically, with a short
/// random suffix so two runs started in the same second stay distinct.
pub fn generate_batch_id() -> String {
    let ts = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", ts, &suffix[..8])
}

/// Hex-encoded SHA-256 of arbitrary bytes, used for source-file provenance.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Title-cases a descriptive string ("blue  moon tavern" -> "Blue Moon Tavern").
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_ids_are_unique_and_timestamped() {
        let a = generate_batch_id();
        let b = generate_batch_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), "YYYYMMDD_HHMMSS_".len() + 8);
    }

    #[test]
    fn sha256_is_stable() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn title_case_normalizes_spacing_and_case() {
        assert_eq!(title_case("  jOHN   doe "), "John Doe");
        assert_eq!(title_case("SEATTLE"), "Seattle");
        assert_eq!(title_case(""), "");
    }
}
