use async_trait::async_trait;
use chrono::Utc;
use log::{ error, info };
use redis::{ AsyncCommands, Client };
use serde::{ Deserialize, Serialize };
use std::time::Duration;

use super::{
    normalize_email,
    validate_feedback,
    validate_password,
    AccountError,
    AccountStore,
    PasswordHasher,
};
use crate::retry::{ Attempt, RetryOutcome, RetryPolicy };

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Serialize, Deserialize)]
struct StoredUser {
    password_hash: String,
    created_at: i64,
}

/// Users live in one hash keyed by email so registration is a single `HSETNX`.
pub struct RedisAccountStore {
    client: Client,
    key_prefix: String,
    hasher: PasswordHasher,
    connect_policy: RetryPolicy,
}

impl RedisAccountStore {
    pub fn new(url: &str, key_prefix: String, hasher: PasswordHasher) -> Result<Self, AccountError> {
        info!("Account store configured at {}", url);
        Ok(Self {
            client: Client::open(url)?,
            key_prefix,
            hasher,
            connect_policy: RetryPolicy::new(CONNECT_ATTEMPTS, CONNECT_DELAY),
        })
    }

    fn users_key(&self) -> String {
        format!("{}users", self.key_prefix)
    }

    fn feedback_key(&self) -> String {
        format!("{}feedback", self.key_prefix)
    }

    fn feedback_record_key(&self, id: u64) -> String {
        format!("{}feedback:{}", self.key_prefix, id)
    }

    fn feedback_seq_key(&self) -> String {
        format!("{}feedback:seq", self.key_prefix)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, AccountError> {
        let client = &self.client;
        let outcome = self.connect_policy.run("account store connect", |_| async move {
            match client.get_multiplexed_async_connection().await {
                Ok(conn) => Attempt::Done(conn),
                Err(e) => Attempt::Failed(e),
            }
        }).await;

        match outcome {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::Exhausted { attempts, last_error } => {
                let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
                error!("Account store unreachable after {} attempt(s): {}", attempts, reason);
                Err(AccountError::Storage(reason))
            }
        }
    }
}

#[async_trait]
impl AccountStore for RedisAccountStore {
    async fn register(&self, email: &str, password: &str) -> Result<(), AccountError> {
        let email = normalize_email(email)?;
        validate_password(password)?;
        let record = StoredUser {
            password_hash: self.hasher.hash(password),
            created_at: Utc::now().timestamp(),
        };
        let json = serde_json::to_string(&record).map_err(|e| AccountError::Storage(e.to_string()))?;

        let mut conn = self.get_connection().await?;
        let created: bool = conn.hset_nx(self.users_key(), &email, json).await?;
        if !created {
            return Err(AccountError::AlreadyExists(email));
        }
        Ok(())
    }

    async fn verify(&self, email: &str, password: &str) -> Result<bool, AccountError> {
        let email = normalize_email(email)?;
        let mut conn = self.get_connection().await?;
        let stored: Option<String> = conn.hget(self.users_key(), &email).await?;

        let Some(json) = stored else {
            return Ok(false);
        };
        match serde_json::from_str::<StoredUser>(&json) {
            Ok(user) => Ok(self.hasher.verify(password, &user.password_hash)),
            Err(e) => {
                error!("Error parsing stored account for {}: {}", email, e);
                Ok(false)
            }
        }
    }

    async fn submit_feedback(&self, email: &str, message: &str) -> Result<u64, AccountError> {
        let message = validate_feedback(message)?;
        let mut conn = self.get_connection().await?;

        let id: u64 = conn.incr(self.feedback_seq_key(), 1).await?;
        let fields = [
            ("id", id.to_string()),
            ("user", email.to_string()),
            ("message", message),
            ("created_at", Utc::now().timestamp().to_string()),
        ];
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(self.feedback_record_key(id), &fields)
            .ignore()
            .rpush(self.feedback_key(), id)
            .ignore()
            .query_async(&mut conn).await?;
        Ok(id)
    }
}
