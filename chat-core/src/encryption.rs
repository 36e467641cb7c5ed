use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Result};
use hkdf::Hkdf;
use sha2::Sha256;
use uuid::Uuid;

const NONCE_LEN: usize = 12;

/// Encrypt message content for storage with a key bound to its chat context.
/// Output layout: `nonce (12 bytes) || ciphertext`.
pub fn encrypt_content(content: &str, context_id: Uuid, master_key: &str) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(&derive_context_key(master_key, context_id)?);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, content.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

pub fn decrypt_content(sealed: &[u8], context_id: Uuid, master_key: &str) -> Result<String> {
    if sealed.len() < NONCE_LEN {
        return Err(anyhow!("Invalid encrypted content: too short"));
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(&derive_context_key(master_key, context_id)?);

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| anyhow!("Decryption failed: {}", e))?;

    String::from_utf8(plaintext).map_err(|e| anyhow!("Invalid UTF-8 after decryption: {}", e))
}

fn derive_context_key(master_key: &str, context_id: Uuid) -> Result<Key<Aes256Gcm>> {
    let master_key_bytes = if master_key.len() == 64 {
        hex::decode(master_key).map_err(|e| anyhow!("Invalid hex master key: {}", e))?
    } else {
        // Raw bytes, truncated or zero-padded to 32
        let mut key_bytes = master_key.as_bytes().to_vec();
        key_bytes.resize(32, 0);
        key_bytes
    };

    let hk = Hkdf::<Sha256>::new(Some(b"chat-content"), &master_key_bytes);
    let mut okm = [0u8; 32];
    hk.expand(context_id.as_bytes(), &mut okm)
        .map_err(|e| anyhow!("HKDF expansion failed: {}", e))?;

    Ok(*Key::<Aes256Gcm>::from_slice(&okm))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn sealed_content_opens_with_the_same_context() {
        let ctx = Uuid::new_v4();
        let sealed = encrypt_content("see you at the venue", ctx, MASTER).unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"see you at the venue");
        assert_eq!(decrypt_content(&sealed, ctx, MASTER).unwrap(), "see you at the venue");
    }

    #[test]
    fn another_context_cannot_open_it() {
        let sealed = encrypt_content("private", Uuid::new_v4(), MASTER).unwrap();
        assert!(decrypt_content(&sealed, Uuid::new_v4(), MASTER).is_err());
    }

    #[test]
    fn truncated_input_is_rejected() {
        assert!(decrypt_content(&[0u8; 4], Uuid::new_v4(), MASTER).is_err());
    }
}
