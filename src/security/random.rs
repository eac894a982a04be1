use rand::rngs::OsRng;
use rand::{Rng, RngCore};

const INVITE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Short hex code for email verification / password reset.
pub fn generate_code(length: usize) -> String {
    let mut bytes = vec![0u8; length.div_ceil(2)];
    OsRng.fill_bytes(&mut bytes);
    let mut code = hex_encode(&bytes);
    code.truncate(length);
    code
}

/// 16 random bytes, hex encoded: 32 characters identifying a device.
pub fn generate_device_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

/// Alphanumeric invite code.
pub fn generate_invite_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| INVITE_ALPHABET[rng.gen_range(0..INVITE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_has_requested_length_and_hex_alphabet() {
        let code = generate_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn device_id_is_32_hex_chars() {
        let id = generate_device_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn invite_code_is_alphanumeric() {
        let code = generate_invite_code(10);
        assert_eq!(code.len(), 10);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_values_differ() {
        assert_ne!(generate_device_id(), generate_device_id());
        assert_ne!(generate_invite_code(10), generate_invite_code(10));
    }
}
