//! Credential vault: decrypts per-account transport credentials on demand.
//!
//! Credentials are stored as base64(IV || AES-256-CBC ciphertext) of a JSON
//! credential document, keyed by a single process-wide master key. The vault
//! is an explicitly constructed component injected where needed; there is no
//! process-global instance, so tests run against a throwaway key.

mod credential;
mod error;
mod vault;

pub use credential::Credential;
pub use error::VaultError;
pub use vault::{MasterKey, Vault};
