//! The `twx2` multi-phase password digest.
//!
//! Stored form: `twx2$<hex salt>$<hex digest>`. The algorithm is fixed for
//! compatibility with existing stored hashes:
//!
//! 1. `A = SHA-256(pepperA ‖ salt ‖ pw ‖ decimal(len(pw)))`
//! 2. `B = mix(SHA-512(pepperB ‖ A ‖ salt ‖ pw))`, a per-byte XOR with `A`,
//!    the salt and an index constant followed by a left rotation
//! 3. `C = PBKDF2-HMAC-SHA256(B[..48] ‖ pw ‖ salt, salt ‖ A[..8] ‖ B[..8])`,
//!    `75000 + salt[0]*97 + salt[1]*53` rounds, 32 bytes
//! 4. a 96-byte braid of `A`, `B`, `C` and the salt
//! 5. `digest = SHA-256(pepperC ‖ braid ‖ C ‖ salt ‖ A[..16])`
//!
//! `pw` is the NFKC-normalised password encoded as UTF-8.

use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Version tag prefixed to every stored hash.
pub const PASSWORD_HASH_VERSION: &str = "twx2";

/// Salt length used when generating fresh hashes.
pub const SALT_LEN: usize = 16;

const PEPPER_A: [u8; 19] = [
    61, 5, 238, 173, 192, 102, 87, 9, 226, 223, 206, 109, 89, 46, 239, 209, 244, 116, 25,
];
const PEPPER_B: [u8; 18] = [
    61, 5, 238, 173, 192, 102, 87, 9, 226, 223, 206, 110, 80, 42, 230, 157, 175, 48,
];
const PEPPER_C: [u8; 19] = [
    61, 5, 238, 173, 192, 102, 87, 9, 226, 223, 206, 107, 84, 51, 234, 209, 244, 116, 25,
];

const BRAID_LEN: usize = 96;

/// Errors from hashing with an explicit salt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordError {
    /// The salt is empty, of odd length, or not hexadecimal.
    #[error("invalid hex salt: {0}")]
    InvalidSalt(String),
}

/// Pepper bytes are stored obfuscated; each byte is XORed with an index mask.
fn decode_pepper(encoded: &[u8]) -> Vec<u8> {
    let decoded: String = encoded
        .iter()
        .enumerate()
        .map(|(i, &v)| char::from(v ^ ((i * 41 + 73) & 0xff) as u8))
        .collect();
    decoded.into_bytes()
}

fn decode_salt(salt_hex: &str) -> Result<Vec<u8>, PasswordError> {
    let lowered = salt_hex.to_ascii_lowercase();
    if lowered.is_empty() {
        return Err(PasswordError::InvalidSalt(salt_hex.to_string()));
    }
    hex::decode(&lowered).map_err(|_| PasswordError::InvalidSalt(salt_hex.to_string()))
}

fn mix_phase(input: &[u8], reference: &[u8], salt: &[u8]) -> Vec<u8> {
    input
        .iter()
        .enumerate()
        .map(|(i, &left)| {
            let value = left
                ^ reference[i % reference.len()]
                ^ salt[(i * 7) % salt.len()]
                ^ ((i * 17 + 31) & 0xff) as u8;
            value.rotate_left(((i % 7) + 1) as u32 % 8)
        })
        .collect()
}

/// Hash `password` with the given hex salt.
pub fn hash_password_with_salt(password: &str, salt_hex: &str) -> Result<String, PasswordError> {
    let salt = decode_salt(salt_hex)?;
    let normalized: String = password.nfkc().collect();
    let pw = normalized.as_bytes();

    let phase_a: [u8; 32] = Sha256::new()
        .chain_update(decode_pepper(&PEPPER_A))
        .chain_update(&salt)
        .chain_update(pw)
        .chain_update(pw.len().to_string())
        .finalize()
        .into();

    let seed = Sha512::new()
        .chain_update(decode_pepper(&PEPPER_B))
        .chain_update(phase_a)
        .chain_update(&salt)
        .chain_update(pw)
        .finalize();
    let phase_b = mix_phase(&seed, &phase_a, &salt);

    let key_material = [&phase_b[..48], pw, &salt[..]].concat();
    let kdf_salt = [&salt[..], &phase_a[..8], &phase_b[..8]].concat();
    let iterations = 75_000
        + u32::from(salt.first().copied().unwrap_or(0)) * 97
        + u32::from(salt.get(1).copied().unwrap_or(0)) * 53;
    let mut phase_c = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(&key_material, &kdf_salt, iterations, &mut phase_c);

    let braid: Vec<u8> = (0..BRAID_LEN)
        .map(|i| {
            let value = phase_a[i % phase_a.len()]
                ^ phase_b[i % phase_b.len()]
                ^ phase_c[i % phase_c.len()]
                ^ salt[i % salt.len()]
                ^ ((i * 29 + 19) & 0xff) as u8;
            value.rotate_left(((i % 5) + 1) as u32 % 8)
        })
        .collect();

    let digest = Sha256::new()
        .chain_update(decode_pepper(&PEPPER_C))
        .chain_update(&braid)
        .chain_update(phase_c)
        .chain_update(&salt)
        .chain_update(&phase_a[..16])
        .finalize();

    Ok(format!(
        "{PASSWORD_HASH_VERSION}${}${}",
        salt_hex.to_ascii_lowercase(),
        hex::encode(digest)
    ))
}

/// Hash `password` with a freshly generated random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt_hex = hex::encode(salt);
    // A freshly encoded salt is always valid hex.
    hash_password_with_salt(password, &salt_hex).unwrap_or_default()
}

/// Verify `password` against a stored `twx2$salt$digest` string.
///
/// Malformed stored values, unknown versions and invalid salts all verify
/// as `false`.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((version, salt, digest)) = split_stored(stored) else {
        return false;
    };
    if !version.eq_ignore_ascii_case(PASSWORD_HASH_VERSION) || digest.is_empty() {
        return false;
    }
    match hash_password_with_salt(password, salt) {
        Ok(computed) => constant_time_eq(
            computed.as_bytes(),
            stored.to_ascii_lowercase().as_bytes(),
        ),
        Err(_) => false,
    }
}

/// Split `version$salt$digest`, enforcing `[a-z0-9]+`, hex and hex.
fn split_stored(stored: &str) -> Option<(&str, &str, &str)> {
    let mut parts = stored.split('$');
    let version = parts.next()?;
    let salt = parts.next()?;
    let digest = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let valid = !version.is_empty()
        && version.chars().all(|c| c.is_ascii_alphanumeric())
        && !salt.is_empty()
        && salt.chars().all(|c| c.is_ascii_hexdigit())
        && !digest.is_empty()
        && digest.chars().all(|c| c.is_ascii_hexdigit());
    valid.then_some((version, salt, digest))
}

/// Equal-length XOR-accumulate comparison.
fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ROOT_HASH: &str = "twx2$50f2a4c71e3d9984a4f95d4bc38af6f0$b8376ffdb6a22dd564716785a6a679c4e56103139c7aa84169fdf615482ea92c";

    #[test]
    fn test_pepper_decoding() {
        assert_eq!(decode_pepper(&PEPPER_A), b"twui-phase-alpha-v2");
        assert_eq!(decode_pepper(&PEPPER_B), b"twui-phase-beta-v2");
        assert_eq!(decode_pepper(&PEPPER_C), b"twui-phase-gamma-v2");
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(
            hash_password_with_salt("hunter2", "00112233445566778899aabbccddeeff").unwrap(),
            "twx2$00112233445566778899aabbccddeeff$c87f2ff43b115accb4b4eb884c57b891725cf8d8fc5cd0eddc9f54068ef93471"
        );
        assert_eq!(
            hash_password_with_salt("hunter2", "FFEEDDCCBBAA99887766554433221100").unwrap(),
            "twx2$ffeeddccbbaa99887766554433221100$01cefe71d0e96891428dfebf30ac63cc36d7ee5493cba119adfce3d93f48c81d"
        );
    }

    #[test]
    fn test_verify_seed_hash() {
        assert!(verify_password("root", ROOT_HASH));
        assert!(verify_password("root", &ROOT_HASH.to_uppercase().replace("TWX2", "twx2")));
        assert!(!verify_password("toor", ROOT_HASH));
    }

    #[test]
    fn test_random_salt_round_trip() {
        let stored = hash_password("correct horse");
        assert!(stored.starts_with("twx2$"));
        assert_eq!(stored.split('$').nth(1).unwrap().len(), SALT_LEN * 2);
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("wrong horse", &stored));
    }

    #[test]
    fn test_malformed_stored_values() {
        assert!(!verify_password("root", ""));
        assert!(!verify_password("root", "twx2$zz$00"));
        assert!(!verify_password("root", "twx1$50f2$00"));
        assert!(!verify_password("root", "twx2$abc$00"));
        assert!(!verify_password("root", "twx2$50f2$00$extra"));
    }

    #[test]
    fn test_invalid_salt() {
        assert!(hash_password_with_salt("x", "").is_err());
        assert!(hash_password_with_salt("x", "abc").is_err());
        assert!(hash_password_with_salt("x", "nothex").is_err());
    }

    #[test]
    fn test_rotate_matches_reference() {
        // ((v << s) | (v >> (8 - s))) & 0xff
        for v in [0u8, 1, 0x80, 0xa5, 0xff] {
            for s in 1..8u32 {
                let reference = (((v as u32) << s) | ((v as u32) >> (8 - s))) & 0xff;
                assert_eq!(u32::from(v.rotate_left(s)), reference);
            }
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
