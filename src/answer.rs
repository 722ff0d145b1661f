use log::{ error, info, warn };
use std::sync::Arc;

use crate::config::prompt::PromptConfig;
use crate::history::format_history_for_prompt;
use crate::llm::chat::{ ChatClient, CompletionError, CompletionErrorKind };
use crate::models::chat::{ ConversationMessage, Notice, SearchResult };

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    /// `Some` only when the answer was degraded.
    pub notice: Option<Notice>,
}

impl Answer {
    pub fn is_degraded(&self) -> bool {
        self.notice.is_some()
    }
}

/// One bulleted line per result, or the no-results placeholder.
pub fn render_context(results: &[SearchResult], no_results: &str) -> String {
    if results.is_empty() {
        return no_results.to_string();
    }
    results
        .iter()
        .map(|r| format!("- {}: {} (Link: {})", r.title, r.body, r.url))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone)]
pub struct AnswerSynthesizer {
    chat_client: Arc<dyn ChatClient>,
    prompt_config: Arc<PromptConfig>,
    history_len: usize,
}

impl AnswerSynthesizer {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        prompt_config: Arc<PromptConfig>,
        history_len: usize
    ) -> Self {
        Self {
            chat_client,
            prompt_config,
            history_len,
        }
    }

    /// How many trailing transcript messages make it into a prompt.
    pub fn history_len(&self) -> usize {
        self.history_len
    }

    pub fn build_prompt(
        &self,
        query: &str,
        context: &[SearchResult],
        history: &[ConversationMessage]
    ) -> String {
        let context_block = render_context(context, &self.prompt_config.no_results_context);
        let start = history.len().saturating_sub(self.history_len);
        let history_block = format_history_for_prompt(
            &self.prompt_config.history_header,
            &history[start..]
        );
        self.prompt_config.answer_prompt(&context_block, &history_block, query)
    }

    /// Single attempt; every failure degrades to the apology text plus a notice.
    pub async fn answer(
        &self,
        query: &str,
        context: &[SearchResult],
        history: &[ConversationMessage]
    ) -> Answer {
        let prompt = self.build_prompt(query, context, history);
        info!(
            "Requesting completion from {} ({} context result(s), {} prompt chars)",
            self.chat_client.get_model(),
            context.len(),
            prompt.len()
        );

        match self.chat_client.complete(&self.prompt_config.system_message, &prompt).await {
            Ok(text) if !text.trim().is_empty() => Answer { text, notice: None },
            Ok(_) => {
                warn!("Completion API returned an empty answer");
                self.degraded(&CompletionError::generic("empty completion"))
            }
            Err(e) => {
                error!("Completion failed ({}): {}", e.kind, e);
                self.degraded(&e)
            }
        }
    }

    fn degraded(&self, e: &CompletionError) -> Answer {
        let notice = match e.kind {
            CompletionErrorKind::QuotaExceeded => self.prompt_config.budget_notice.clone(),
            CompletionErrorKind::Transient | CompletionErrorKind::Generic =>
                self.prompt_config.generic_notice(&e.message),
        };
        Answer {
            text: self.prompt_config.apology.clone(),
            notice: Some(Notice::error(notice)),
        }
    }
}
