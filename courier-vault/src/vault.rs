//! AES-256-CBC encryption of credential blobs.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use courier_common::account::SenderAccount;
use rand::RngCore;

use crate::{Credential, VaultError};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// Process-wide symmetric master key.
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    /// Parse a hex-encoded 32-byte key.
    pub fn from_hex(hex_key: &str) -> Result<Self, VaultError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| VaultError::InvalidKey(format!("not valid hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Wrap raw key bytes; must be exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            VaultError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", bytes.len()))
        })?;
        Ok(Self(key))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// Holds the master key and performs blob encryption/decryption.
///
/// `encrypt`/`decrypt` are pure in (key, iv, plaintext); the only state is
/// the key itself. Callers must not log decrypted output.
#[derive(Debug)]
pub struct Vault {
    key: MasterKey,
}

impl Vault {
    #[must_use]
    pub const fn new(key: MasterKey) -> Self {
        Self { key }
    }

    /// Encrypt a plaintext into base64(IV || ciphertext).
    ///
    /// A fresh random IV is drawn per call, so encrypting the same plaintext
    /// twice never yields the same blob.
    #[must_use]
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.0.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);
        BASE64.encode(blob)
    }

    /// Decrypt a blob produced by [`Vault::encrypt`].
    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>, VaultError> {
        let raw = BASE64
            .decode(blob.trim())
            .map_err(|e| VaultError::Malformed(format!("not valid base64: {e}")))?;

        if raw.len() <= IV_LEN {
            return Err(VaultError::Malformed(format!(
                "blob too short to carry an IV: {} bytes",
                raw.len()
            )));
        }

        let (iv, ciphertext) = raw.split_at(IV_LEN);
        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| VaultError::Malformed("IV extraction failed".to_string()))?;

        Aes256CbcDec::new(&self.key.0.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|e| VaultError::Decrypt(e.to_string()))
    }

    /// Serialize and encrypt a credential into a storable blob.
    pub fn seal(&self, credential: &Credential) -> Result<String, VaultError> {
        let json = serde_json::to_vec(credential)?;
        Ok(self.encrypt(&json))
    }

    /// Decrypt and deserialize the credential for one account, checking that
    /// the stored credential matches the account's transport kind.
    pub fn reveal(&self, account: &SenderAccount) -> Result<Credential, VaultError> {
        let plaintext = self.decrypt(&account.credential_blob)?;
        let credential: Credential = serde_json::from_slice(&plaintext)?;

        if credential.kind() == account.transport {
            Ok(credential)
        } else {
            Err(VaultError::KindMismatch {
                expected: account.transport.to_string(),
                found: credential.kind().to_string(),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::Utc;
    use courier_common::account::{AccountId, AccountStatus, TransportKind};

    use super::*;

    fn test_vault() -> Vault {
        Vault::new(MasterKey::from_bytes(&[7u8; 32]).unwrap())
    }

    #[test]
    fn master_key_rejects_wrong_length() {
        assert!(MasterKey::from_bytes(&[0u8; 16]).is_err());
        assert!(MasterKey::from_hex("deadbeef").is_err());
        assert!(MasterKey::from_hex(&"ab".repeat(32)).is_ok());
    }

    #[test]
    fn round_trip_preserves_utf8() {
        let vault = test_vault();
        for plaintext in ["a", "hello world", "ünïcødé ✉ 你好", &"x".repeat(4096)] {
            let blob = vault.encrypt(plaintext.as_bytes());
            let back = vault.decrypt(&blob).unwrap();
            assert_eq!(back, plaintext.as_bytes());
        }
    }

    #[test]
    fn fresh_iv_per_call() {
        let vault = test_vault();
        let a = vault.encrypt(b"same plaintext");
        let b = vault.encrypt(b"same plaintext");
        assert_ne!(a, b);
        assert_eq!(vault.decrypt(&a).unwrap(), vault.decrypt(&b).unwrap());
    }

    #[test]
    fn decrypt_rejects_garbage() {
        let vault = test_vault();
        assert!(matches!(
            vault.decrypt("not-base64!!!"),
            Err(VaultError::Malformed(_))
        ));
        // Valid base64 but shorter than one IV.
        assert!(matches!(
            vault.decrypt(&BASE64.encode([1u8; 8])),
            Err(VaultError::Malformed(_))
        ));
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let vault = test_vault();
        let blob = vault.encrypt(b"secret");

        let other = Vault::new(MasterKey::from_bytes(&[8u8; 32]).unwrap());
        assert!(matches!(other.decrypt(&blob), Err(VaultError::Decrypt(_))));
    }

    #[test]
    fn reveal_checks_transport_kind() {
        let vault = test_vault();
        let credential = Credential::Smtp {
            host: "smtp.example.com".to_string(),
            port: 465,
            secure: true,
            username: "mailer".to_string(),
            password: "pw".to_string(),
        };

        let mut account = SenderAccount {
            id: AccountId::new("acct-1"),
            address: "sender@example.com".to_string(),
            transport: TransportKind::Smtp,
            credential_blob: vault.seal(&credential).unwrap(),
            status: AccountStatus::Active,
            daily_limit: 100,
            warmup_limit: None,
            batch_size: 10,
            send_delay_ms: 0,
            daily_sent: 0,
            last_reset_date: Utc::now().date_naive(),
            last_used_at: None,
        };

        let revealed = vault.reveal(&account).unwrap();
        assert_eq!(revealed.kind(), TransportKind::Smtp);

        account.transport = TransportKind::Oauth;
        assert!(matches!(
            vault.reveal(&account),
            Err(VaultError::KindMismatch { .. })
        ));
    }
}
