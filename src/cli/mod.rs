use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Research chat: web search + LLM synthesis", long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// API Key for the OpenAI-compatible completion API. Falls back to a placeholder when empty.
    #[arg(long, env = "CHAT_API_KEY", default_value = "dummy", hide_env_values = true)]
    pub chat_api_key: String,

    /// Base URL for the completion API (e.g., https://api.openai.com/v1)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let the client handle defaults if None
    pub chat_base_url: Option<String>,

    /// Model name for chat completion (e.g., gpt-4o, gpt-5)
    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-4o")]
    pub chat_model: String,

    // --- Web Search Args ---
    /// Base URL of the DuckDuckGo HTML endpoint.
    #[arg(long, env = "SEARCH_BASE_URL")]
    pub search_base_url: Option<String>,

    /// Maximum number of search results embedded in the prompt.
    #[arg(long, env = "SEARCH_MAX_RESULTS", default_value = "7")]
    pub search_max_results: usize,

    /// Attempts per search before continuing without context.
    #[arg(long, env = "SEARCH_MAX_ATTEMPTS", default_value = "3")]
    pub search_max_attempts: u32,

    /// Fixed delay between search attempts, in milliseconds.
    #[arg(long, env = "SEARCH_RETRY_DELAY_MS", default_value = "1000")]
    pub search_retry_delay_ms: u64,

    // --- Prompt Args ---
    /// Number of recent transcript messages included in the prompt.
    #[arg(long, env = "HISTORY_FOR_PROMPT_LEN", default_value = "5")]
    pub history_for_prompt_len: usize,

    /// Optional JSON file overriding the built-in prompt and notice strings.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- Account Store Args ---
    /// Require a logged-in session before a question is answered.
    #[arg(long, env = "REQUIRE_LOGIN", default_value = "false")]
    pub require_login: bool,

    /// Account store type (memory, redis)
    #[arg(long, env = "ACCOUNT_STORE_TYPE", default_value = "memory")]
    pub account_store_type: String,

    /// Account store endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "ACCOUNT_STORE_URL", default_value = "redis://127.0.0.1:6379")]
    pub account_store_url: String,

    /// Prefix for account and feedback keys.
    #[arg(long, env = "ACCOUNT_KEY_PREFIX", default_value = "vaiz:")]
    pub account_key_prefix: String,

    /// Server-side secret mixed into every password hash.
    #[arg(long, env = "PASSWORD_PEPPER", default_value = "", hide_env_values = true)]
    pub password_pepper: String,

    /// Contact address shown to users after they submit feedback.
    #[arg(long, env = "ADMIN_EMAIL", default_value = "admin@example.com")]
    pub admin_email: String,

    // --- Server Args ---
    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Port for the HTTP API. The API is disabled when unset.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Optional API Key required for clients to connect to the WebSocket server. If set, clients must sign the handshake.
    #[arg(long, env = "SERVER_API_KEY", hide_env_values = true)]
    pub server_api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_single_user_setup() {
        let args = Args::try_parse_from(["vaiz"]).unwrap();

        assert_eq!(args.chat_model, "gpt-4o");
        assert_eq!(args.search_max_results, 7);
        assert_eq!(args.search_max_attempts, 3);
        assert_eq!(args.search_retry_delay_ms, 1000);
        assert_eq!(args.history_for_prompt_len, 5);
        assert_eq!(args.account_store_type, "memory");
        assert!(!args.require_login);
        assert!(args.http_port.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "vaiz",
            "--search-max-results",
            "5",
            "--require-login",
            "--http-port",
            "8080",
        ]).unwrap();

        assert_eq!(args.search_max_results, 5);
        assert!(args.require_login);
        assert_eq!(args.http_port, Some(8080));
    }
}
