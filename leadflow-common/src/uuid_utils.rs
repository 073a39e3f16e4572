//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new UUIDv4 rendered as a hyphenated string
pub fn generate_string() -> String {
    generate().to_string()
}

/// Short random suffix used in consumer identities ("worker-1a2b3c4d")
pub fn short_id() -> String {
    generate().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_string_parses_back() {
        let id = generate_string();
        assert_eq!(Uuid::parse_str(&id).unwrap().to_string(), id);
    }

    #[test]
    fn test_short_id_is_eight_hex_chars() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
