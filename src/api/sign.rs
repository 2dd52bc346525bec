use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Request signature for the affiliate gateway: every parameter as
/// `key` + `value`, in key order, HMAC-SHA256'd with the app secret and
/// rendered as upper-case hex.
pub fn sign(secret: &str, params: &BTreeMap<String, String>) -> String {
    let payload: String = params.iter().map(|(k, v)| format!("{}{}", k, v)).collect();
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode_upper(mac.finalize().into_bytes())
}
