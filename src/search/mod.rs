pub mod duckduckgo;

use async_trait::async_trait;
use log::{ info, warn };
use std::sync::Arc;

use crate::models::chat::SearchResult;
use crate::retry::{ Attempt, RetryOutcome, RetryPolicy };

pub use self::duckduckgo::DuckDuckGoProvider;

/// Appended to every query to bias results toward academic sources.
pub const SCHOLARLY_QUALIFIER: &str = "research paper scientific article scholarly";
pub const DEFAULT_MAX_RESULTS: usize = 7;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("search provider returned HTTP {status}")]
    Status { status: reqwest::StatusCode },
    #[error("{0}")]
    Provider(String),
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize
    ) -> Result<Vec<SearchResult>, SearchError>;
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub attempts: u32,
    /// Set only when the final attempt raised; an empty final answer leaves it `None`.
    pub last_error: Option<SearchError>,
}

impl SearchOutcome {
    pub fn is_found(&self) -> bool {
        !self.results.is_empty()
    }
}

pub fn scholarly_query(query: &str) -> String {
    format!("{} {}", query.trim(), SCHOLARLY_QUALIFIER)
}

#[derive(Clone)]
pub struct SearchGateway {
    provider: Arc<dyn SearchProvider>,
    policy: RetryPolicy,
    max_results: usize,
}

impl SearchGateway {
    pub fn new(provider: Arc<dyn SearchProvider>, policy: RetryPolicy, max_results: usize) -> Self {
        Self {
            provider,
            policy,
            max_results: max_results.max(1),
        }
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Never fails: exhausted retries yield an empty list.
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        self.lookup(query).await.results
    }

    pub async fn lookup(&self, query: &str) -> SearchOutcome {
        let scholarly = scholarly_query(query);
        let scholarly = scholarly.as_str();
        let provider = &self.provider;
        let max_results = self.max_results;

        let outcome = self.policy.run("web search", |_| {
            async move {
                match provider.search(scholarly, max_results).await {
                    Ok(results) if results.is_empty() => Attempt::Retry,
                    Ok(results) => Attempt::Done(results),
                    Err(e) => Attempt::Failed(e),
                }
            }
        }).await;

        match outcome {
            RetryOutcome::Success { mut value, attempts } => {
                value.truncate(max_results);
                info!("Search found {} result(s) after {} attempt(s)", value.len(), attempts);
                SearchOutcome {
                    results: value,
                    attempts,
                    last_error: None,
                }
            }
            RetryOutcome::Exhausted { attempts, last_error } => {
                warn!("Search exhausted after {} attempt(s), continuing without context", attempts);
                SearchOutcome {
                    results: Vec::new(),
                    attempts,
                    last_error,
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub enum Scripted {
        Fail(&'static str),
        Results(Vec<SearchResult>),
    }

    /// Replays a fixed script of answers and records the queries it saw.
    pub struct ScriptedProvider {
        script: Mutex<VecDeque<Scripted>>,
        pub queries: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                queries: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SearchProvider for ScriptedProvider {
        async fn search(
            &self,
            query: &str,
            _max_results: usize
        ) -> Result<Vec<SearchResult>, SearchError> {
            self.queries.lock().unwrap().push(query.to_string());
            match self.script.lock().unwrap().pop_front() {
                Some(Scripted::Fail(msg)) => Err(SearchError::Provider(msg.to_string())),
                Some(Scripted::Results(results)) => Ok(results),
                None => Ok(Vec::new()),
            }
        }
    }

    pub fn results(count: usize) -> Vec<SearchResult> {
        (0..count)
            .map(|i| SearchResult {
                title: format!("Paper {}", i),
                body: format!("Abstract {}", i),
                url: format!("https://papers.example.org/{}", i),
            })
            .collect()
    }
}
