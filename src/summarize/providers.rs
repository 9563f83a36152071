//! Cloud summarization providers (Gemini, OpenAI-compatible).

use tracing::debug;

use crate::config::SummarizerConfig;

const GEMINI_DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";
const OPENAI_DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODEL: &str = "gpt-4o-mini";

/// Common trait for all summary providers.
#[allow(async_fn_in_trait)]
pub trait SummaryProvider: Send + Sync {
    /// Generate feedback text from the assembled prompt.
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

/// Google Gemini `generateContent` adapter.
pub struct GeminiProvider {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: &str, endpoint: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            endpoint: endpoint.unwrap_or(GEMINI_DEFAULT_ENDPOINT).to_string(),
            client: reqwest::Client::new(),
        }
    }
}

impl SummaryProvider for GeminiProvider {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        debug!(chars = prompt.len(), "Sending prompt to Gemini");
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = self
            .client
            .post(format!("{}?key={}", self.endpoint, self.api_key))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {}: {}", status, body);
        }

        let json: serde_json::Value = resp.json().await?;
        let text = json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Malformed Gemini response"))?;

        Ok(text.to_string())
    }
}

// ---------------------------------------------------------------------------
// OpenAI chat completions
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat completions adapter.
pub struct OpenAiProvider {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, endpoint: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            endpoint: endpoint.unwrap_or(OPENAI_DEFAULT_ENDPOINT).to_string(),
            client: reqwest::Client::new(),
        }
    }
}

impl SummaryProvider for OpenAiProvider {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        debug!(chars = prompt.len(), "Sending prompt to OpenAI");
        let body = serde_json::json!({
            "model": OPENAI_MODEL,
            "messages": [{ "role": "user", "content": prompt }]
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {}: {}", status, body);
        }

        let json: serde_json::Value = resp.json().await?;
        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Malformed OpenAI response"))?;

        Ok(text.to_string())
    }
}

/// Enum-dispatch wrapper over the provider backends.
///
/// This avoids dyn-compatibility issues with async trait methods.
pub enum ProviderAdapter {
    Gemini(GeminiProvider),
    OpenAi(OpenAiProvider),
}

impl ProviderAdapter {
    pub async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        match self {
            Self::Gemini(p) => p.generate(prompt).await,
            Self::OpenAi(p) => p.generate(prompt).await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gemini(_) => "gemini",
            Self::OpenAi(_) => "openai",
        }
    }
}

/// Build the provider chain from config, in fallback order. Providers with
/// no configured API key are skipped.
pub fn create_providers(cfg: &SummarizerConfig) -> Vec<ProviderAdapter> {
    let mut providers = Vec::new();
    if let Some(key) = cfg.gemini_api_key.as_deref().filter(|k| !k.is_empty()) {
        providers.push(ProviderAdapter::Gemini(GeminiProvider::new(
            key,
            cfg.gemini_endpoint.as_deref(),
        )));
    }
    if let Some(key) = cfg.openai_api_key.as_deref().filter(|k| !k.is_empty()) {
        providers.push(ProviderAdapter::OpenAi(OpenAiProvider::new(
            key,
            cfg.openai_endpoint.as_deref(),
        )));
    }
    providers
}
