use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{
    normalize_email,
    validate_feedback,
    validate_password,
    AccountError,
    AccountStore,
    PasswordHasher,
};

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub password_hash: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct FeedbackRecord {
    pub id: u64,
    pub user: String,
    pub message: String,
    pub created_at: i64,
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, UserRecord>,
    feedback: Vec<FeedbackRecord>,
}

/// Process-local store; everything is lost on restart.
pub struct MemoryAccountStore {
    hasher: PasswordHasher,
    tables: Mutex<Tables>,
}

impl MemoryAccountStore {
    pub fn new(hasher: PasswordHasher) -> Self {
        Self {
            hasher,
            tables: Mutex::new(Tables::default()),
        }
    }

    pub async fn feedback(&self) -> Vec<FeedbackRecord> {
        self.tables.lock().await.feedback.clone()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn register(&self, email: &str, password: &str) -> Result<(), AccountError> {
        let email = normalize_email(email)?;
        validate_password(password)?;
        let record = UserRecord {
            password_hash: self.hasher.hash(password),
            created_at: Utc::now().timestamp(),
        };

        let mut tables = self.tables.lock().await;
        if tables.users.contains_key(&email) {
            return Err(AccountError::AlreadyExists(email));
        }
        tables.users.insert(email, record);
        Ok(())
    }

    async fn verify(&self, email: &str, password: &str) -> Result<bool, AccountError> {
        let email = normalize_email(email)?;
        let tables = self.tables.lock().await;
        Ok(
            tables.users
                .get(&email)
                .map(|user| self.hasher.verify(password, &user.password_hash))
                .unwrap_or(false)
        )
    }

    async fn submit_feedback(&self, email: &str, message: &str) -> Result<u64, AccountError> {
        let message = validate_feedback(message)?;
        let mut tables = self.tables.lock().await;
        let id = (tables.feedback.len() as u64) + 1;
        tables.feedback.push(FeedbackRecord {
            id,
            user: email.to_string(),
            message,
            created_at: Utc::now().timestamp(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryAccountStore {
        MemoryAccountStore::new(PasswordHasher::new("test-pepper"))
    }

    #[tokio::test]
    async fn register_then_verify() {
        let store = store();
        store.register("Rina@Kampus.ac.id", "rahasia123").await.unwrap();

        assert!(store.verify("rina@kampus.ac.id", "rahasia123").await.unwrap());
        assert!(!store.verify("rina@kampus.ac.id", "wrong-pass").await.unwrap());
        assert!(!store.verify("nobody@kampus.ac.id", "rahasia123").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let store = store();
        store.register("a@b.c", "rahasia123").await.unwrap();

        let err = store.register("A@B.C", "another123").await.unwrap_err();
        assert!(matches!(err, AccountError::AlreadyExists(email) if email == "a@b.c"));
        assert!(store.verify("a@b.c", "rahasia123").await.unwrap());
    }

    #[tokio::test]
    async fn feedback_ids_increase() {
        let store = store();
        assert_eq!(store.submit_feedback("a@b.c", "Great answers").await.unwrap(), 1);
        assert_eq!(store.submit_feedback("a@b.c", "  Needs sources  ").await.unwrap(), 2);
        assert!(store.submit_feedback("a@b.c", "   ").await.is_err());

        let feedback = store.feedback().await;
        assert_eq!(feedback.len(), 2);
        assert_eq!(feedback[1].message, "Needs sources");
    }
}
