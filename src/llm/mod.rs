pub mod chat;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
/// Used when no key is configured so startup never fails; calls will be rejected upstream.
pub const PLACEHOLDER_API_KEY: &str = "dummy";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            completion_model: None,
            base_url: None,
        }
    }
}

impl LlmConfig {
    pub fn api_key_or_placeholder(&self) -> String {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .unwrap_or(PLACEHOLDER_API_KEY)
            .to_string()
    }

    pub fn model_or_default(&self) -> String {
        self.completion_model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_MODEL)
            .to_string()
    }

    pub fn base_url_or_default(&self) -> String {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_fall_back() {
        let config = LlmConfig {
            api_key: Some("  ".into()),
            completion_model: Some(String::new()),
            base_url: None,
        };

        assert_eq!(config.api_key_or_placeholder(), "dummy");
        assert_eq!(config.model_or_default(), "gpt-4o");
        assert_eq!(config.base_url_or_default(), "https://api.openai.com/v1");
    }

    #[test]
    fn configured_values_win() {
        let config = LlmConfig {
            api_key: Some("sk-test".into()),
            completion_model: Some("gpt-4o-mini".into()),
            base_url: Some("http://localhost:8080/v1".into()),
        };

        assert_eq!(config.api_key_or_placeholder(), "sk-test");
        assert_eq!(config.model_or_default(), "gpt-4o-mini");
        assert_eq!(config.base_url_or_default(), "http://localhost:8080/v1");
    }
}
