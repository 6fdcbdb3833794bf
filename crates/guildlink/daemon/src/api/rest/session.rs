//! OAuth2 state cookie and cookie header helpers
//!
//! The state sent to Discord is kept client side in a cookie of the form
//! `state.signature`, where the signature is a blake3 keyed hash under a key
//! derived from `server.session_key`.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

/// Cookie holding the signed OAuth2 state
pub const STATE_COOKIE: &str = "guildlink_state";

/// Cookie set by the EVE SSO service with the authenticated character
pub const CHARACTER_COOKIE: &str = "char";

const STATE_MAX_AGE_SECS: u64 = 10 * 60;
const KEY_CONTEXT: &str = "guildlink 2024-01-01 oauth2 state cookie";

/// Signs and verifies state cookie values
#[derive(Clone)]
pub struct StateSigner {
    key: [u8; 32],
}

impl StateSigner {
    pub fn new(session_key: &str) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, session_key.as_bytes()),
        }
    }

    /// Fresh random state for one authorization round trip
    pub fn new_state() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn signature(&self, state: &str) -> blake3::Hash {
        blake3::keyed_hash(&self.key, state.as_bytes())
    }

    /// Cookie value carrying `state`
    pub fn sign(&self, state: &str) -> String {
        format!("{}.{}", state, self.signature(state).to_hex())
    }

    /// State carried by a cookie value, if the signature holds
    pub fn verify<'a>(&self, value: &'a str) -> Option<&'a str> {
        let (state, signature) = value.rsplit_once('.')?;
        let signature = blake3::Hash::from_hex(signature).ok()?;

        // blake3::Hash compares in constant time
        (signature == self.signature(state)).then_some(state)
    }
}

/// Value of the named cookie in the request's Cookie headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}

/// Set-Cookie value storing a signed state
pub fn state_cookie(value: &str) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        STATE_COOKIE, value, STATE_MAX_AGE_SECS
    )
}

/// Set-Cookie value removing the state cookie
pub fn expired_state_cookie() -> String {
    format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", STATE_COOKIE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_signed_state_verifies() {
        let signer = StateSigner::new("secret");
        let state = StateSigner::new_state();

        let cookie = signer.sign(&state);
        assert_eq!(signer.verify(&cookie), Some(state.as_str()));
    }

    #[test]
    fn test_tampered_or_foreign_state_rejected() {
        let signer = StateSigner::new("secret");
        let cookie = signer.sign("abc");

        let tampered = cookie.replacen("abc", "abd", 1);
        assert_eq!(signer.verify(&tampered), None);
        assert_eq!(StateSigner::new("other").verify(&cookie), None);
        assert_eq!(signer.verify("abc"), None);
        assert_eq!(signer.verify("abc.nothex"), None);
    }

    #[test]
    fn test_states_are_unique() {
        assert_ne!(StateSigner::new_state(), StateSigner::new_state());
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; char=eyJhIjoxfQ=="),
        );
        headers.append(header::COOKIE, HeaderValue::from_static("guildlink_state=s.sig"));

        assert_eq!(read_cookie(&headers, "char").as_deref(), Some("eyJhIjoxfQ=="));
        assert_eq!(read_cookie(&headers, STATE_COOKIE).as_deref(), Some("s.sig"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let set = state_cookie("s.sig");
        assert!(set.starts_with("guildlink_state=s.sig;"));
        assert!(set.contains("HttpOnly"));
        assert!(set.contains("Max-Age=600"));
        assert!(expired_state_cookie().contains("Max-Age=0"));
    }
}
