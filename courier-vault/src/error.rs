use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    /// The master key is absent or not exactly 32 bytes.
    #[error("Invalid master key: {0}")]
    InvalidKey(String),

    /// The stored blob is not valid base64 or is too short to carry an IV.
    #[error("Malformed credential blob: {0}")]
    Malformed(String),

    /// Decryption failed (wrong key or corrupted ciphertext).
    #[error("Decryption failed: {0}")]
    Decrypt(String),

    /// The decrypted payload is not a valid credential document.
    #[error("Credential deserialization failed: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// The stored credential kind does not match the account's transport.
    #[error("Credential kind mismatch: account expects {expected}, blob holds {found}")]
    KindMismatch { expected: String, found: String },
}
