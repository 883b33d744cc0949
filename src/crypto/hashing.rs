// License keys and content digests.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

// Crockford-style alphabet without I, L, O, U to avoid misreads.
const KEY_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const KEY_GROUPS: usize = 4;
const KEY_GROUP_LEN: usize = 5;
const KEY_PREFIX: &str = "LIC";

/// Generates a fresh license key of the form `LIC-XXXXX-XXXXX-XXXXX-XXXXX`.
pub fn generate_license_key() -> String {
    let mut rng = rand::thread_rng();
    let mut key = String::from(KEY_PREFIX);
    for _ in 0..KEY_GROUPS {
        key.push('-');
        for _ in 0..KEY_GROUP_LEN {
            let idx = rng.gen_range(0..KEY_ALPHABET.len());
            key.push(KEY_ALPHABET[idx] as char);
        }
    }
    key
}

/// Canonical form used before hashing: trimmed and uppercased.
pub fn normalize_license_key(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}

/// Checks the `LIC-XXXXX-...` shape without touching the database.
pub fn is_well_formed_license_key(key: &str) -> bool {
    let key = normalize_license_key(key);
    let mut parts = key.split('-');
    if parts.next() != Some(KEY_PREFIX) {
        return false;
    }
    let groups: Vec<&str> = parts.collect();
    groups.len() == KEY_GROUPS
        && groups.iter().all(|g| {
            g.len() == KEY_GROUP_LEN && g.bytes().all(|b| KEY_ALPHABET.contains(&b))
        })
}

/// Stored form of a license key: hex HMAC-SHA256 keyed with the license secret.
pub fn hash_license_key(secret: &str, key: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(normalize_license_key(key).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Display prefix kept next to the hash (`LIC-ABCDE`).
pub fn license_key_prefix(key: &str) -> String {
    normalize_license_key(key)
        .splitn(3, '-')
        .take(2)
        .collect::<Vec<_>>()
        .join("-")
}

/// Hex SHA-256 of a byte payload (upload checksums).
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
