use argon2::Argon2;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use tracing::debug;

use super::{KvStore, StorageError};

/// Reserved key holding the key-derivation salt.
const SALT_KEY: &str = "sampleagent_salt";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Seals every value written to the inner store. Values are stored as
/// hex(nonce || ciphertext); the salt lives unencrypted under `SALT_KEY`.
pub struct EncryptedStore<S> {
    inner: S,
    cipher: ChaCha20Poly1305,
}

impl<S: KvStore> EncryptedStore<S> {
    pub fn new(inner: S, passphrase: &str) -> Result<Self, StorageError> {
        let salt = match inner.get(SALT_KEY)? {
            Some(hex_salt) => hex::decode(hex_salt.trim())
                .map_err(|e| StorageError::Crypto(format!("invalid salt: {}", e)))?,
            None => {
                let mut salt = [0u8; SALT_LEN];
                rand::thread_rng().fill_bytes(&mut salt);
                inner.set(SALT_KEY, &hex::encode(salt))?;
                debug!("Generated new storage salt");
                salt.to_vec()
            }
        };

        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
            .map_err(|e| StorageError::Crypto(format!("key derivation failed: {}", e)))?;

        Ok(Self {
            inner,
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    fn seal(&self, plaintext: &str) -> Result<String, StorageError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| StorageError::Crypto(e.to_string()))?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(hex::encode(sealed))
    }

    fn open(&self, sealed: &str) -> Result<String, StorageError> {
        let bytes = hex::decode(sealed.trim())
            .map_err(|e| StorageError::Crypto(format!("not hex: {}", e)))?;
        if bytes.len() < NONCE_LEN {
            return Err(StorageError::Crypto("sealed value too short".to_string()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| StorageError::Crypto(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| StorageError::Crypto(e.to_string()))
    }
}

impl<S: KvStore> KvStore for EncryptedStore<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.inner.get(key)? {
            Some(sealed) => self.open(&sealed).map(Some),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let sealed = self.seal(value)?;
        self.inner.set(key, &sealed)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}
