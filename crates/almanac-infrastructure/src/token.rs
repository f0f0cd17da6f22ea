//! Opaque token minting and session-key binding.
//!
//! The session key is the only thing ever handed to the client (carried in
//! a cookie); payload data never leaves the server. Entity ids (projects,
//! cart items) use the same alphabet with a shorter length.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;

/// Raw entropy of a session key, before encoding.
pub const SESSION_KEY_BYTES: usize = 32;

/// Raw entropy of a project/cart-item id.
pub const ENTITY_ID_BYTES: usize = 16;

fn mint(len: usize) -> String {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Mints a new cryptographically random session key.
pub fn mint_session_key() -> String {
    mint(SESSION_KEY_BYTES)
}

/// Mints an opaque id for a project or cart item.
pub fn mint_entity_id() -> String {
    mint(ENTITY_ID_BYTES)
}

/// Whether a presented token decodes to exactly the expected entropy.
fn is_valid_session_key(token: &str) -> bool {
    URL_SAFE_NO_PAD
        .decode(token)
        .map(|raw| raw.len() == SESSION_KEY_BYTES)
        .unwrap_or(false)
}

/// Binds an inbound request to a session key.
///
/// Returns the presented token when it is well-formed, otherwise mints a
/// fresh one. The second element tells the caller whether the key is new
/// and must be persisted client-side (cookie set).
pub fn resolve_session_key(presented: Option<&str>) -> (String, bool) {
    match presented {
        Some(token) if is_valid_session_key(token) => (token.to_string(), false),
        _ => (mint_session_key(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minted_keys_are_unique_and_opaque() {
        let a = mint_session_key();
        let b = mint_session_key();
        assert_ne!(a, b);
        // 32 bytes of entropy, URL-safe base64 without padding
        assert_eq!(a.len(), 43);
        assert!(!a.contains('/') && !a.contains('+') && !a.contains('='));
    }

    #[test]
    fn test_resolve_returns_presented_key() {
        let key = mint_session_key();
        let (resolved, minted) = resolve_session_key(Some(&key));
        assert_eq!(resolved, key);
        assert!(!minted);
    }

    #[test]
    fn test_resolve_mints_for_absent_or_malformed() {
        let (_, minted) = resolve_session_key(None);
        assert!(minted);

        let (resolved, minted) = resolve_session_key(Some("not-a-token"));
        assert!(minted);
        assert_ne!(resolved, "not-a-token");

        // Right alphabet, wrong entropy
        let short = mint_entity_id();
        let (_, minted) = resolve_session_key(Some(&short));
        assert!(minted);
    }
}
