use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Base64-encoded HMAC-SHA256 of `data` under `secret`. This is the signature scheme payment providers use for
/// the `X-Payment-Signature` header.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    // Hmac accepts keys of any length, so this never actually fails; an empty signature fails verification.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(data);
    let result = mac.finalize().into_bytes();
    base64::encode(result)
}
