//! Installation-bound credential encryption
//!
//! The encryption key is derived with PBKDF2-HMAC-SHA256 from an
//! installation fingerprint and a random salt persisted once per store.
//! Ciphertext is ChaCha20-Poly1305 laid out as `[nonce (12 bytes)][ciphertext]`
//! and base64 encoded.
//!
//! This binds the stored key to one installation and detects tampering. It
//! is not a defence against anyone who can read both the store and the
//! fingerprint inputs.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use sha2::Sha256;
use tokio::sync::OnceCell;
use zeroize::Zeroizing;

use crate::constants::vault::{
    KEY_LEN, NONCE_LEN, PBKDF2_ITERATIONS, SALT_LEN, USER_AGENT_PREFIX_LEN,
};
use crate::error::DeskError;
use crate::storage::KeyValueStore;

type DerivedKey = Zeroizing<[u8; KEY_LEN]>;

/// Poly1305 tag appended to every ciphertext
const TAG_LEN: usize = 16;

/// Identifier of the running client, in the shape of an HTTP user agent
pub fn user_agent() -> String {
    format!(
        "deskbot/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Key-derivation password: the origin followed by a capped user agent
pub fn installation_fingerprint(origin: &str, user_agent: &str) -> String {
    let agent: String = user_agent.chars().take(USER_AGENT_PREFIX_LEN).collect();
    format!("{origin}{agent}")
}

/// PBKDF2-HMAC-SHA256, deterministic for a given password, salt and round count
pub fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> DerivedKey {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key[..]);
    key
}

/// Encrypts and decrypts credential strings for one installation
pub struct VaultCipher {
    durable: Arc<dyn KeyValueStore>,
    salt_key: String,
    password: Zeroizing<String>,
    iterations: u32,
    key: OnceCell<DerivedKey>,
}

impl VaultCipher {
    /// `iterations` below the 100,000 floor are raised to it
    pub fn new(
        durable: Arc<dyn KeyValueStore>,
        namespace: &str,
        fingerprint: String,
        iterations: u32,
    ) -> Self {
        Self {
            durable,
            salt_key: format!("{namespace}.install_salt"),
            password: Zeroizing::new(fingerprint),
            iterations: iterations.max(PBKDF2_ITERATIONS),
            key: OnceCell::new(),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Read the installation salt, creating it on first use
    ///
    /// A salt that is not valid base64 of the right length is replaced;
    /// anything encrypted under the old one becomes unreadable.
    fn installation_salt(&self) -> Result<Vec<u8>, DeskError> {
        if let Some(encoded) = self.durable.get(&self.salt_key)? {
            match STANDARD.decode(encoded.trim()) {
                Ok(salt) if salt.len() == SALT_LEN => return Ok(salt),
                _ => tracing::warn!(key = %self.salt_key, "Installation salt is corrupt, regenerating"),
            }
        }

        let mut salt = vec![0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        self.durable.set(&self.salt_key, &STANDARD.encode(&salt))?;
        tracing::info!(key = %self.salt_key, "Generated installation salt");
        Ok(salt)
    }

    /// Derived key, computed once per cipher on a blocking thread
    async fn key(&self) -> Result<&DerivedKey, DeskError> {
        self.key
            .get_or_try_init(|| async {
                let salt = self.installation_salt()?;
                let password = self.password.clone();
                let iterations = self.iterations;
                tokio::task::spawn_blocking(move || {
                    derive_key(password.as_bytes(), &salt, iterations)
                })
                .await
                .map_err(|e| DeskError::CredentialCrypto(format!("key derivation failed: {e}")))
            })
            .await
    }

    pub async fn encrypt(&self, plaintext: &str) -> Result<String, DeskError> {
        let key = self.key().await?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| DeskError::CredentialCrypto("encryption failed".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    pub async fn decrypt(&self, encoded: &str) -> Result<Zeroizing<String>, DeskError> {
        let blob = STANDARD
            .decode(encoded.trim())
            .map_err(|_| DeskError::CredentialCrypto("ciphertext is not valid base64".to_string()))?;
        // An empty plaintext still carries a nonce and a tag
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(DeskError::CredentialCrypto(
                "ciphertext is too short".to_string(),
            ));
        }

        let key = self.key().await?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);

        let mut plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
                .map_err(|_| {
                    DeskError::CredentialCrypto(
                        "authentication failed (tampered data or different installation)"
                            .to_string(),
                    )
                })?,
        );

        String::from_utf8(std::mem::take(&mut *plaintext))
            .map(Zeroizing::new)
            .map_err(|_| DeskError::CredentialCrypto("plaintext is not UTF-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn cipher_on(store: Arc<MemoryStore>) -> VaultCipher {
        VaultCipher::new(
            store,
            "test",
            installation_fingerprint("test", &user_agent()),
            PBKDF2_ITERATIONS,
        )
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_key(b"origin", b"0123456789abcdef", 1_000);
        let b = derive_key(b"origin", b"0123456789abcdef", 1_000);
        let c = derive_key(b"origin", b"fedcba9876543210", 1_000);
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn fingerprint_caps_user_agent() {
        let agent = "x".repeat(200);
        let fp = installation_fingerprint("origin", &agent);
        assert_eq!(fp.len(), "origin".len() + USER_AGENT_PREFIX_LEN);
    }

    #[test]
    fn iterations_have_a_floor() {
        let cipher = VaultCipher::new(Arc::new(MemoryStore::new()), "t", "fp".into(), 10);
        assert_eq!(cipher.iterations(), PBKDF2_ITERATIONS);
    }

    #[tokio::test]
    async fn encrypt_then_decrypt() {
        let store = Arc::new(MemoryStore::new());
        let cipher = cipher_on(store.clone());

        let first = cipher.encrypt("secret-value").await.unwrap();
        let second = cipher.encrypt("secret-value").await.unwrap();
        assert_ne!(first, second);
        assert!(!first.contains("secret-value"));

        assert_eq!(cipher.decrypt(&first).await.unwrap().as_str(), "secret-value");
        assert_eq!(cipher.decrypt(&second).await.unwrap().as_str(), "secret-value");

        // Salt was persisted once and is reused by a fresh cipher
        let salt = store.get("test.install_salt").unwrap().unwrap();
        let again = cipher_on(store.clone());
        assert_eq!(again.decrypt(&first).await.unwrap().as_str(), "secret-value");
        assert_eq!(store.get("test.install_salt").unwrap().unwrap(), salt);
    }

    #[tokio::test]
    async fn tampering_is_detected() {
        let cipher = cipher_on(Arc::new(MemoryStore::new()));
        let encoded = cipher.encrypt("secret-value").await.unwrap();

        let mut blob = STANDARD.decode(&encoded).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        let tampered = STANDARD.encode(blob);

        assert!(matches!(
            cipher.decrypt(&tampered).await,
            Err(DeskError::CredentialCrypto(_))
        ));
    }

    #[tokio::test]
    async fn different_salt_cannot_decrypt() {
        let encoded = cipher_on(Arc::new(MemoryStore::new()))
            .encrypt("secret-value")
            .await
            .unwrap();
        let other = cipher_on(Arc::new(MemoryStore::new()));
        assert!(matches!(
            other.decrypt(&encoded).await,
            Err(DeskError::CredentialCrypto(_))
        ));
    }

    #[tokio::test]
    async fn empty_plaintext_round_trips() {
        let cipher = cipher_on(Arc::new(MemoryStore::new()));
        let sealed = cipher.encrypt("").await.unwrap();
        assert_eq!(STANDARD.decode(&sealed).unwrap().len(), NONCE_LEN + TAG_LEN);
        assert_eq!(cipher.decrypt(&sealed).await.unwrap().as_str(), "");

        let nonce_only = STANDARD.encode([0u8; NONCE_LEN]);
        assert!(matches!(
            cipher.decrypt(&nonce_only).await,
            Err(DeskError::CredentialCrypto(_))
        ));
    }

    #[tokio::test]
    async fn garbage_input_is_rejected() {
        let cipher = cipher_on(Arc::new(MemoryStore::new()));
        for input in ["not base64 at all!", "AAAA", ""] {
            assert!(
                matches!(cipher.decrypt(input).await, Err(DeskError::CredentialCrypto(_))),
                "{input:?}"
            );
        }
    }
}
