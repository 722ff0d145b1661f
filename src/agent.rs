use crate::answer::AnswerSynthesizer;
use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig };
use crate::llm::LlmConfig;
use crate::llm::chat::new_client as new_chat_client;
use crate::models::chat::{ ConversationMessage, Notice, SearchResult };
use crate::retry::RetryPolicy;
use crate::search::{ DuckDuckGoProvider, SearchGateway };
use crate::session::Session;

use log::{ info, warn };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Observable steps of one turn. A turn always ends in `Answered` or `Degraded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Searching,
    Found(usize),
    NotFound,
    Synthesizing,
    Answered,
    Degraded,
}

impl TurnPhase {
    pub fn name(&self) -> &'static str {
        match self {
            TurnPhase::Searching => "searching",
            TurnPhase::Found(_) => "found",
            TurnPhase::NotFound => "not_found",
            TurnPhase::Synthesizing => "synthesizing",
            TurnPhase::Answered => "answered",
            TurnPhase::Degraded => "degraded",
        }
    }

    pub fn label(&self, prompts: &PromptConfig) -> String {
        match self {
            TurnPhase::Searching => prompts.status_searching.clone(),
            TurnPhase::Found(_) => prompts.status_found.clone(),
            TurnPhase::NotFound => prompts.status_not_found.clone(),
            TurnPhase::Synthesizing => prompts.status_synthesizing.clone(),
            TurnPhase::Answered => prompts.status_answered.clone(),
            TurnPhase::Degraded => prompts.status_degraded.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub answer: String,
    /// Exactly what the gateway returned, in provider order.
    pub sources: Vec<SearchResult>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    NotAuthenticated,
    EmptyQuery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed(TurnReply),
    Abandoned(AbandonReason),
}

#[derive(Clone)]
pub struct ResearchAgent {
    gateway: SearchGateway,
    synthesizer: AnswerSynthesizer,
    prompt_config: Arc<PromptConfig>,
    require_login: bool,
}

fn report(progress: Option<&UnboundedSender<TurnPhase>>, phase: TurnPhase) {
    info!("Turn phase: {}", phase.name());
    if let Some(tx) = progress {
        // Receiver gone means the client left; the turn still completes.
        let _ = tx.send(phase);
    }
}

impl ResearchAgent {
    pub fn new(
        gateway: SearchGateway,
        synthesizer: AnswerSynthesizer,
        prompt_config: Arc<PromptConfig>,
        require_login: bool
    ) -> Self {
        Self {
            gateway,
            synthesizer,
            prompt_config,
            require_login,
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let prompt_config = prompt::load_prompts_or_default(args.prompts_path.as_deref())?;

        let chat_config = LlmConfig {
            api_key: Some(args.chat_api_key.clone()),
            completion_model: Some(args.chat_model.clone()),
            base_url: args.chat_base_url.clone(),
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Model={}, BaseURL={}",
            chat_client.get_model(),
            chat_config.base_url_or_default()
        );
        if chat_config.api_key_or_placeholder() == crate::llm::PLACEHOLDER_API_KEY {
            warn!("CHAT_API_KEY is not set; completions will fail until it is configured");
        }

        let provider = DuckDuckGoProvider::new(args.search_base_url.clone())?;
        let policy = RetryPolicy::new(
            args.search_max_attempts,
            Duration::from_millis(args.search_retry_delay_ms)
        );
        let gateway = SearchGateway::new(Arc::new(provider), policy, args.search_max_results);
        info!(
            "Search gateway configured: MaxResults={}, Attempts={}, Delay={}ms",
            gateway.max_results(),
            policy.max_attempts,
            args.search_retry_delay_ms
        );

        let synthesizer = AnswerSynthesizer::new(
            chat_client,
            Arc::clone(&prompt_config),
            args.history_for_prompt_len
        );

        Ok(Self::new(gateway, synthesizer, prompt_config, args.require_login))
    }

    pub fn prompt_config(&self) -> &PromptConfig {
        &self.prompt_config
    }

    pub fn requires_login(&self) -> bool {
        self.require_login
    }

    pub fn abandon_notice(&self, reason: AbandonReason) -> Notice {
        match reason {
            AbandonReason::NotAuthenticated => Notice::warning(self.prompt_config.login_required.clone()),
            AbandonReason::EmptyQuery => Notice::warning(self.prompt_config.empty_query.clone()),
        }
    }

    /// Search then synthesize, with no session attached.
    pub async fn ask(
        &self,
        query: &str,
        history: &[ConversationMessage],
        progress: Option<&UnboundedSender<TurnPhase>>
    ) -> TurnReply {
        let mut notices = Vec::new();

        report(progress, TurnPhase::Searching);
        let outcome = self.gateway.lookup(query).await;
        if outcome.is_found() {
            report(progress, TurnPhase::Found(outcome.results.len()));
        } else {
            if let Some(e) = &outcome.last_error {
                notices.push(Notice::error(self.prompt_config.search_failed_notice(&e.to_string())));
            }
            report(progress, TurnPhase::NotFound);
        }

        report(progress, TurnPhase::Synthesizing);
        let answer = self.synthesizer.answer(query, &outcome.results, history).await;
        match answer.notice {
            Some(notice) => {
                notices.push(notice);
                report(progress, TurnPhase::Degraded);
            }
            None => report(progress, TurnPhase::Answered),
        }

        TurnReply {
            answer: answer.text,
            sources: outcome.results,
            notices,
        }
    }

    /// Runs one turn against `session`. Abandoned turns leave the transcript untouched;
    /// completed turns append exactly one user and one assistant message.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        query: &str,
        progress: Option<&UnboundedSender<TurnPhase>>
    ) -> TurnOutcome {
        if self.require_login && !session.is_authenticated() {
            warn!("Session {} tried to ask without logging in", session.id());
            return TurnOutcome::Abandoned(AbandonReason::NotAuthenticated);
        }
        let query = query.trim();
        if query.is_empty() {
            return TurnOutcome::Abandoned(AbandonReason::EmptyQuery);
        }

        let history = session.transcript().recent(self.synthesizer.history_len());
        let reply = self.ask(query, history, progress).await;
        session.record_turn(query, &reply.answer);
        TurnOutcome::Completed(reply)
    }
}
