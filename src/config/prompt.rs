use lazy_static::lazy_static;
use log::info;
use regex::{ Captures, Regex };
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

lazy_static! {
    static ref ANSWER_PLACEHOLDER: Regex = Regex::new(r"\{(persona|context|history|question)\}").unwrap();
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Prompt file IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Prompt JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Prompt template '{0}' is missing placeholder {1}")]
    MissingPlaceholder(&'static str, &'static str),
}

/// Every string the model or the user gets to see. Missing JSON keys keep the defaults.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    pub system_message: String,
    pub persona: String,
    /// Placeholders: `{persona}`, `{context}`, `{history}`, `{question}`.
    pub answer_template: String,
    pub no_results_context: String,
    pub history_header: String,
    pub apology: String,
    pub budget_notice: String,
    pub generic_notice: String,
    pub search_failed_notice: String,
    pub status_searching: String,
    pub status_found: String,
    pub status_not_found: String,
    pub status_synthesizing: String,
    pub status_answered: String,
    pub status_degraded: String,
    pub login_required: String,
    pub login_failed: String,
    pub account_error: String,
    pub empty_query: String,
    pub feedback_received: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_message: "Anda adalah asisten peneliti AI yang selalu memberikan jawaban atas setiap input pengguna dengan integritas ilmiah dan kepatuhan hukum.".into(),
            persona: "Anda adalah AI Peneliti Senior yang ahli dalam menganalisis karya ilmiah global.

Tugas Anda:
1. Jawablah SETIAP pertanyaan pengguna dengan informasi yang relevan dan mendalam. Jika konteks pencarian tidak mencukupi, gunakan pengetahuan internal Anda untuk memberikan jawaban yang paling membantu.
2. Berikan kesimpulan yang akurat, objektif, dan mendalam berdasarkan konteks pencarian.
3. Pastikan seluruh jawaban mematuhi koridor hukum dan etika penelitian internasional.
4. Hindari segala bentuk saran atau konten yang melanggar hukum (bebas dari tindak pidana).
5. Gunakan bahasa ilmiah yang mudah dipahami namun tetap formal.".into(),
            answer_template: "{persona}

Konteks Pencarian Ilmiah:
{context}

{history}Pertanyaan Peneliti: {question}

Kesimpulan Ilmiah (Bahasa Indonesia):".into(),
            no_results_context: "Tidak ada hasil pencarian yang ditemukan.".into(),
            history_header: "Riwayat Percakapan:".into(),
            apology: "Maaf, saya mengalami kendala teknis saat memproses jawaban.".into(),
            budget_notice: "Budget cloud gratis telah terlampaui. Mohon tunggu beberapa saat.".into(),
            generic_notice: "Terjadi kesalahan pada AI: {error}".into(),
            search_failed_notice: "Gagal mencari di internet: {error}".into(),
            status_searching: "🔍 Mencari informasi terbaru...".into(),
            status_found: "✅ Informasi ditemukan! Menganalisis...".into(),
            status_not_found: "⚠️ Tidak menemukan informasi spesifik, mencoba menjawab dengan pengetahuan internal...".into(),
            status_synthesizing: "🧠 Menyusun kesimpulan ilmiah...".into(),
            status_answered: "✅ Kesimpulan selesai.".into(),
            status_degraded: "⚠️ Kesimpulan tidak dapat disusun.".into(),
            login_required: "Silakan login terlebih dahulu untuk mulai bertanya.".into(),
            login_failed: "Email atau kata sandi salah.".into(),
            account_error: "Gagal memproses akun: {error}".into(),
            empty_query: "Pertanyaan tidak boleh kosong.".into(),
            feedback_received: "Terima kasih! Masukan Anda telah diterima. Untuk bantuan lebih lanjut hubungi {admin}.".into(),
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        for placeholder in ["{context}", "{question}"] {
            if !self.answer_template.contains(placeholder) {
                return Err(PromptError::MissingPlaceholder("answer_template", placeholder));
            }
        }
        Ok(())
    }

    /// Single pass over the template, so braces inside inserted text stay as they are.
    pub fn answer_prompt(&self, context: &str, history: &str, question: &str) -> String {
        ANSWER_PLACEHOLDER.replace_all(&self.answer_template, |caps: &Captures| {
            match &caps[1] {
                "persona" => self.persona.clone(),
                "context" => context.to_string(),
                "history" => history.to_string(),
                _ => question.to_string(),
            }
        }).into_owned()
    }

    pub fn generic_notice(&self, error: &str) -> String {
        self.generic_notice.replace("{error}", error)
    }

    pub fn search_failed_notice(&self, error: &str) -> String {
        self.search_failed_notice.replace("{error}", error)
    }

    pub fn account_error(&self, error: &str) -> String {
        self.account_error.replace("{error}", error)
    }

    pub fn feedback_received(&self, admin: &str) -> String {
        self.feedback_received.replace("{admin}", admin)
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(&path)?;
    let config: PromptConfig = serde_json::from_str(&file_content)?;
    config.validate()?;
    info!("Loaded prompt overrides from {}", path.as_ref().display());
    Ok(Arc::new(config))
}

/// Built-in defaults unless a prompts file is configured.
pub fn load_prompts_or_default(path: Option<&str>) -> Result<Arc<PromptConfig>, PromptError> {
    match path {
        Some(p) if !p.trim().is_empty() => load_prompts(p),
        _ => Ok(Arc::new(PromptConfig::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_prompt_embeds_every_part() {
        let config = PromptConfig::default();
        let prompt = config.answer_prompt("- A: b (Link: c)", "Riwayat Percakapan:\nUser: hi\n\n", "Apa itu DNA?");

        assert!(prompt.starts_with("Anda adalah AI Peneliti Senior"));
        assert!(prompt.contains("Konteks Pencarian Ilmiah:\n- A: b (Link: c)\n"));
        assert!(prompt.contains("User: hi\n\nPertanyaan Peneliti: Apa itu DNA?"));
        assert!(prompt.ends_with("Kesimpulan Ilmiah (Bahasa Indonesia):"));
    }

    #[test]
    fn placeholders_inside_inserted_text_are_left_alone() {
        let context = "- Template {question} syntax: uses {history} braces (Link: https://x)";
        let history = "Riwayat Percakapan:\nUser: what does {context} mean?\n\n";
        let prompt = PromptConfig::default().answer_prompt(context, history, "QUERY");

        assert!(prompt.contains(context));
        assert!(prompt.contains("User: what does {context} mean?"));
        assert!(prompt.contains("Pertanyaan Peneliti: QUERY"));
    }

    #[test]
    fn empty_history_leaves_no_gap() {
        let prompt = PromptConfig::default().answer_prompt("ctx", "", "q");
        assert!(prompt.contains("ctx\n\nPertanyaan Peneliti: q"));
    }

    #[test]
    fn notices_fill_placeholders() {
        let config = PromptConfig::default();
        assert_eq!(config.generic_notice("boom"), "Terjadi kesalahan pada AI: boom");
        assert_eq!(config.search_failed_notice("timeout"), "Gagal mencari di internet: timeout");
        assert_eq!(config.account_error("taken"), "Gagal memproses akun: taken");
        assert!(config.feedback_received("admin@vaiz.id").contains("admin@vaiz.id"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let path = std::env::temp_dir().join(format!("vaiz-prompts-{}.json", uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&path).unwrap();
        write!(file, r#"{{ "apology": "Sorry, something broke." }}"#).unwrap();

        let config = load_prompts(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.apology, "Sorry, something broke.");
        assert_eq!(config.no_results_context, PromptConfig::default().no_results_context);
    }

    #[test]
    fn template_without_question_is_rejected() {
        let path = std::env::temp_dir().join(format!("vaiz-prompts-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, r#"{ "answer_template": "{context} only" }"#).unwrap();

        let err = load_prompts(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert!(matches!(err, PromptError::MissingPlaceholder("answer_template", "{question}")));
    }

    #[test]
    fn no_path_means_defaults() {
        let config = load_prompts_or_default(None).unwrap();
        assert_eq!(*config, PromptConfig::default());
    }
}
