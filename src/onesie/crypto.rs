use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::common::errors::OnesieError;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

pub const CLIENT_KEY_LEN: usize = 32;

/// A sealed onesie payload: AES-128-CTR ciphertext plus an HMAC-SHA256 tag
/// over `ciphertext || iv`. One-shot: the iv must never be reused with the
/// same key, and randomness is the only uniqueness guarantee.
#[derive(Debug)]
pub struct EncryptedEnvelope {
    pub ciphertext: Vec<u8>,
    pub hmac: Vec<u8>,
    pub iv: [u8; 16],
}

/// Seal `plaintext` under a 32-byte onesie client key.
///
/// The key splits into a 16-byte AES key and a 16-byte HMAC key; the random
/// 16-byte iv doubles as the initial CTR counter block.
pub fn seal(client_key: &[u8], plaintext: &[u8]) -> Result<EncryptedEnvelope, OnesieError> {
    if client_key.len() != CLIENT_KEY_LEN {
        return Err(OnesieError::InvalidKeyLength(client_key.len()));
    }
    let (aes_key, hmac_key) = client_key.split_at(16);

    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut ciphertext = plaintext.to_vec();
    let mut cipher = Aes128Ctr::new_from_slices(aes_key, &iv)
        .map_err(|_| OnesieError::InvalidKeyLength(client_key.len()))?;
    cipher.apply_keystream(&mut ciphertext);

    let mut mac = HmacSha256::new_from_slice(hmac_key)
        .map_err(|_| OnesieError::InvalidKeyLength(client_key.len()))?;
    mac.update(&ciphertext);
    mac.update(&iv);
    let hmac = mac.finalize().into_bytes().to_vec();

    Ok(EncryptedEnvelope {
        ciphertext,
        hmac,
        iv,
    })
}
