pub mod openai;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::LlmConfig;
use self::openai::OpenAIChatClient;

/// Markers providers put in the body when the account has run out of budget.
pub const QUOTA_MARKERS: [&str; 2] = ["FREE_CLOUD_BUDGET_EXCEEDED", "insufficient_quota"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionErrorKind {
    QuotaExceeded,
    Transient,
    Generic,
}

impl fmt::Display for CompletionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionErrorKind::QuotaExceeded => write!(f, "quota exceeded"),
            CompletionErrorKind::Transient => write!(f, "transient"),
            CompletionErrorKind::Generic => write!(f, "generic"),
        }
    }
}

/// Classified at the HTTP boundary so callers branch on `kind`, never on text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CompletionError {
    pub kind: CompletionErrorKind,
    pub message: String,
}

impl CompletionError {
    pub fn new(kind: CompletionErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::QuotaExceeded, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Transient, message)
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Generic, message)
    }
}

pub fn mentions_quota(body: &str) -> bool {
    QUOTA_MARKERS.iter().any(|marker| body.contains(marker))
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// One system message plus one user message in, exactly one completion out.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, CompletionError>;

    fn get_model(&self) -> String;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, CompletionError> {
    let client = OpenAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Returns a fixed result and records every (system, prompt) pair.
    pub struct FakeChatClient {
        reply: Result<String, CompletionError>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeChatClient {
        pub fn replying(text: &str) -> Self {
            Self { reply: Ok(text.to_string()), calls: Mutex::new(Vec::new()) }
        }

        pub fn failing(error: CompletionError) -> Self {
            Self { reply: Err(error), calls: Mutex::new(Vec::new()) }
        }

        pub fn last_prompt(&self) -> Option<String> {
            self.calls.lock().unwrap().last().map(|(_, prompt)| prompt.clone())
        }
    }

    #[async_trait]
    impl ChatClient for FakeChatClient {
        async fn complete(&self, system: &str, prompt: &str) -> Result<String, CompletionError> {
            self.calls.lock().unwrap().push((system.to_string(), prompt.to_string()));
            self.reply.clone()
        }

        fn get_model(&self) -> String {
            "fake-model".to_string()
        }
    }
}
