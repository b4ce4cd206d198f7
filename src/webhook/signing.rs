//! Webhook signature generation (spec.md §4.7): HMAC-SHA256 over
//! `"{id}.{timestamp}.{body}"`, matching the `hmac`/`sha2` idiom used
//! elsewhere in this codebase for token signing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn webhook_id() -> String {
    let mut bytes = [0u8; 8];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    format!("msg_{}", hex::encode(bytes))
}

/// `v1,<base64(HMAC-SHA256(secret, id + "." + ts + "." + body))>`.
pub fn sign(secret: &str, id: &str, timestamp: i64, body: &str) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    let payload = format!("{id}.{timestamp}.{body}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    let digest = mac.finalize().into_bytes();
    Some(format!(
        "v1,{}",
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, digest)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secret_yields_no_signature() {
        assert!(sign("", "msg_1", 0, "{}").is_none());
    }

    #[test]
    fn same_inputs_yield_same_signature() {
        let a = sign("s3cret", "msg_1", 1000, "{\"a\":1}").unwrap();
        let b = sign("s3cret", "msg_1", 1000, "{\"a\":1}").unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("v1,"));
    }

    #[test]
    fn different_secret_yields_different_signature() {
        let a = sign("s3cret", "msg_1", 1000, "{}").unwrap();
        let b = sign("other", "msg_1", 1000, "{}").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn webhook_id_has_expected_prefix() {
        let id = webhook_id();
        assert!(id.starts_with("msg_"));
        assert_eq!(id.len(), "msg_".len() + 16);
    }
}
