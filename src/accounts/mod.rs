mod memory;
mod redis;

use async_trait::async_trait;
use hmac::{ Hmac, Mac };
use log::info;
use sha2::Sha256;
use std::error::Error;
use std::sync::Arc;
use uuid::Uuid;

use crate::cli::Args;

pub use self::memory::MemoryAccountStore;
pub use self::redis::RedisAccountStore;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("account {0} already exists")]
    AlreadyExists(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("account store error: {0}")]
    Storage(String),
}

impl From<::redis::RedisError> for AccountError {
    fn from(err: ::redis::RedisError) -> Self {
        AccountError::Storage(err.to_string())
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn register(&self, email: &str, password: &str) -> Result<(), AccountError>;

    /// `Ok(false)` for unknown emails as well as wrong passwords.
    async fn verify(&self, email: &str, password: &str) -> Result<bool, AccountError>;

    async fn submit_feedback(&self, email: &str, message: &str) -> Result<u64, AccountError>;
}

pub fn normalize_email(email: &str) -> Result<String, AccountError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AccountError::InvalidInput(format!("'{}' is not a valid email address", email))),
    }
}

pub fn validate_password(password: &str) -> Result<(), AccountError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(
            AccountError::InvalidInput(
                format!("password must be at least {} characters", MIN_PASSWORD_LEN)
            )
        );
    }
    Ok(())
}

pub fn validate_feedback(message: &str) -> Result<String, AccountError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AccountError::InvalidInput("feedback message is empty".to_string()));
    }
    Ok(message.to_string())
}

/// Salted HMAC-SHA256 keyed by a server-side pepper, stored as `salt$hex`.
#[derive(Clone)]
pub struct PasswordHasher {
    pepper: Vec<u8>,
}

impl PasswordHasher {
    pub fn new(pepper: &str) -> Self {
        Self { pepper: pepper.as_bytes().to_vec() }
    }

    fn mac(&self, salt: &str, password: &str) -> HmacSha256 {
        // HMAC accepts keys of any length, including empty.
        let mut mac = HmacSha256::new_from_slice(&self.pepper).unwrap_or_else(|_|
            unreachable!("HMAC key length is unrestricted")
        );
        mac.update(salt.as_bytes());
        mac.update(password.as_bytes());
        mac
    }

    pub fn hash(&self, password: &str) -> String {
        let salt = Uuid::new_v4().simple().to_string();
        let digest = self.mac(&salt, password).finalize().into_bytes();
        format!("{}${}", salt, hex::encode(digest))
    }

    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let Some((salt, digest_hex)) = stored.split_once('$') else {
            return false;
        };
        let Ok(digest) = hex::decode(digest_hex) else {
            return false;
        };
        self.mac(salt, password).verify_slice(&digest).is_ok()
    }
}

pub fn create_account_store(args: &Args) -> Result<Arc<dyn AccountStore>, Box<dyn Error + Send + Sync>> {
    let hasher = PasswordHasher::new(&args.password_pepper);
    match args.account_store_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryAccountStore::new(hasher))),
        "redis" => {
            let store = RedisAccountStore::new(
                &args.account_store_url,
                args.account_key_prefix.clone(),
                hasher
            )?;
            Ok(Arc::new(store))
        }
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported account store type: {}", args.account_store_type)
                    )
                )
            ),
    }
}

pub fn initialize_account_store(
    args: &Args
) -> Result<Arc<dyn AccountStore>, Box<dyn Error + Send + Sync>> {
    info!("Accounts and feedback will be stored in: {}", args.account_store_type);
    create_account_store(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Rina@Kampus.AC.id ").unwrap(), "rina@kampus.ac.id");
        assert!(matches!(normalize_email("no-at-sign"), Err(AccountError::InvalidInput(_))));
        assert!(normalize_email("@domain").is_err());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn hashes_verify_and_are_salted() {
        let hasher = PasswordHasher::new("pepper");
        let first = hasher.hash("rahasia123");
        let second = hasher.hash("rahasia123");

        assert_ne!(first, second);
        assert!(hasher.verify("rahasia123", &first));
        assert!(hasher.verify("rahasia123", &second));
        assert!(!hasher.verify("salah", &first));
        assert!(!hasher.verify("rahasia123", "garbage"));
    }

    #[test]
    fn pepper_is_part_of_the_hash() {
        let stored = PasswordHasher::new("one").hash("rahasia123");
        assert!(!PasswordHasher::new("two").verify("rahasia123", &stored));
    }

    #[test]
    fn unknown_store_type_is_rejected() {
        use clap::Parser;
        let args = Args::try_parse_from(["vaiz", "--account-store-type", "postgres"]).unwrap();
        assert!(create_account_store(&args).is_err());
    }
}
