//! Content hashing and log masking
//!
//! The content hash is the effect-level dedup key for insights: SHA-256 of the
//! note text, hex encoded. It depends only on the text, never on transport ids.

use sha2::{Digest, Sha256};

/// SHA-256 of the note text as lowercase hex
pub fn content_hash(note: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(note.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Mask an e-mail address for logs: "alice@example.com" -> "a***e@example.com"
pub fn mask_email(email: &str) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return email.to_string();
    };

    let chars: Vec<char> = local.chars().collect();
    let masked_local = if chars.len() <= 2 {
        "*".repeat(chars.len())
    } else {
        format!(
            "{}{}{}",
            chars[0],
            "*".repeat(chars.len() - 2),
            chars[chars.len() - 1]
        )
    };

    format!("{}@{}", masked_local, domain)
}

/// Mask a phone number for logs, keeping the first and last two characters
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() < 4 {
        return "*".repeat(chars.len());
    }

    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 4), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_deterministic() {
        let a = content_hash("I need urgent pricing for 50 seats");
        let b = content_hash("I need urgent pricing for 50 seats");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_known_vector() {
        // sha256("abc")
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_content_hash_differs_for_different_text() {
        assert_ne!(content_hash("hello"), content_hash("hello "));
    }

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("alice@example.com"), "a***e@example.com");
        assert_eq!(mask_email("al@example.com"), "**@example.com");
        assert_eq!(mask_email("not-an-email"), "not-an-email");
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+79991234567"), "+7********67");
        assert_eq!(mask_phone("123"), "***");
        assert_eq!(mask_phone(""), "");
    }
}
