use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use tokio::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_ANSWER_CHARS: usize = 4000;

pub const FAKE_ANSWER: &str = "This is a synthesized answer based on internal procedures.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Fake,
    OpenAi,
    HuggingFace,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Fake => "fake",
            LlmProvider::OpenAi => "openai",
            LlmProvider::HuggingFace => "huggingface",
            LlmProvider::Ollama => "ollama",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "fake" => Some(LlmProvider::Fake),
            "openai" => Some(LlmProvider::OpenAi),
            "huggingface" | "hf" => Some(LlmProvider::HuggingFace),
            "ollama" => Some(LlmProvider::Ollama),
            _ => None,
        }
    }

    /// False for the deterministic test double.
    pub fn is_real(&self) -> bool {
        !matches!(self, LlmProvider::Fake)
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Fake => "fake",
            LlmProvider::OpenAi => "gpt-4.1-mini",
            LlmProvider::HuggingFace => "meta-llama/Llama-3.1-8B-Instruct",
            LlmProvider::Ollama => "llama3",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
}

impl LlmRequest {
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            user: prompt.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    config: ProviderConfig,
}

#[derive(Clone)]
enum ProviderConfig {
    Fake,
    /// OpenAI and the Hugging Face router share the chat-completions shape.
    ChatCompletions(ChatConfig),
    Ollama(OllamaConfig),
}

#[derive(Clone)]
struct ChatConfig {
    api_key: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Clone)]
struct OllamaConfig {
    base_url: String,
}

impl LlmClient {
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        let config = match provider {
            LlmProvider::Fake => ProviderConfig::Fake,
            LlmProvider::OpenAi => ProviderConfig::ChatCompletions(ChatConfig {
                api_key: read_api_key("OPENAI_API_KEY")?,
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                max_tokens: env_number("TESSERA_MAX_OUTPUT_TOKENS", 256),
                temperature: env_number("TESSERA_TEMPERATURE", 0.2),
            }),
            LlmProvider::HuggingFace => ProviderConfig::ChatCompletions(ChatConfig {
                api_key: read_api_key("HF_API_KEY")?,
                base_url: env::var("HF_BASE_URL")
                    .unwrap_or_else(|_| "https://router.huggingface.co/v1".to_string()),
                max_tokens: env_number("TESSERA_MAX_OUTPUT_TOKENS", 256),
                temperature: env_number("TESSERA_TEMPERATURE", 0.2),
            }),
            LlmProvider::Ollama => ProviderConfig::Ollama(OllamaConfig {
                base_url: env::var("OLLAMA_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            }),
        };
        Ok(Self {
            http,
            provider,
            model,
            config,
        })
    }

    pub fn fake() -> Self {
        Self {
            http: Client::new(),
            provider: LlmProvider::Fake,
            model: LlmProvider::Fake.default_model().to_string(),
            config: ProviderConfig::Fake,
        }
    }

    /// Overrides the endpoint read from the environment.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        match &mut self.config {
            ProviderConfig::ChatCompletions(cfg) => cfg.base_url = base_url,
            ProviderConfig::Ollama(cfg) => cfg.base_url = base_url,
            ProviderConfig::Fake => {}
        }
        self
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Single attempt; callers decide whether a failure is retried.
    pub async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse> {
        debug!(provider = self.provider.as_str(), model = %self.model, "llm_chat");
        match &self.config {
            ProviderConfig::Fake => Ok(LlmResponse {
                content: FAKE_ANSWER.to_string(),
                prompt_tokens: 0,
                completion_tokens: 0,
            }),
            ProviderConfig::ChatCompletions(cfg) => self.chat_completions(cfg, req).await,
            ProviderConfig::Ollama(cfg) => self.chat_ollama(cfg, req).await,
        }
    }

    pub async fn health(&self) -> bool {
        let request = match &self.config {
            ProviderConfig::Fake => return true,
            ProviderConfig::ChatCompletions(cfg) => self
                .http
                .get(format!("{}/models", cfg.base_url.trim_end_matches('/')))
                .bearer_auth(&cfg.api_key),
            ProviderConfig::Ollama(cfg) => self
                .http
                .get(format!("{}/api/tags", cfg.base_url.trim_end_matches('/'))),
        };
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn chat_completions(&self, cfg: &ChatConfig, req: &LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({"role": "system", "content": system }));
        }
        messages.push(json!({"role": "user", "content": req.user }));
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": cfg.max_tokens,
            "temperature": cfg.temperature,
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&cfg.api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("{} request failed", self.provider.as_str()))?;
        let value = decode_body(self.provider, response).await?;
        let content = extract_chat_text(&value).ok_or_else(|| {
            anyhow!(format!("missing text in {} response", self.provider.as_str()))
        })?;
        let usage: ChatUsage = value
            .get("usage")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        Ok(LlmResponse {
            content: clip(&content),
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
        })
    }

    async fn chat_ollama(&self, cfg: &OllamaConfig, req: &LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/api/generate", cfg.base_url.trim_end_matches('/'));
        let mut payload = json!({
            "model": self.model,
            "prompt": req.user,
            "stream": false,
        });
        if let Some(system) = &req.system {
            payload["system"] = json!(system);
        }
        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .with_context(|| "ollama request failed")?
            .error_for_status()
            .context("ollama returned an error")?
            .json::<OllamaResponse>()
            .await
            .context("failed to decode ollama response")?;
        Ok(LlmResponse {
            content: clip(response.response.trim()),
            prompt_tokens: response.prompt_eval_count.unwrap_or(0),
            completion_tokens: response.eval_count.unwrap_or(0),
        })
    }
}

async fn decode_body(provider: LlmProvider, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(anyhow!(format!(
            "{} returned error (status {})",
            provider.as_str(),
            status
        )));
    }
    serde_json::from_str(&body)
        .with_context(|| format!("failed to decode {} response", provider.as_str()))
}

fn extract_chat_text(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.as_array()?.first()?;
    if let Some(message) = choice.get("message") {
        if let Some(text) = message.get("content").and_then(|c| c.as_str()) {
            if !text.trim().is_empty() {
                return Some(text.trim().to_string());
            }
        }
    }
    for key in ["content", "text"] {
        if let Some(text) = choice.get(key).and_then(|t| t.as_str()) {
            if !text.trim().is_empty() {
                return Some(text.trim().to_string());
            }
        }
    }
    None
}

fn clip(text: &str) -> String {
    text.chars().take(MAX_ANSWER_CHARS).collect()
}

fn env_number<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn read_api_key(var: &str) -> Result<String> {
    let value = env::var(var).map_err(|_| anyhow!(format!("{var} is not set")))?;
    let value = value.trim().to_string();
    validate_api_key(var, &value)?;
    Ok(value)
}

fn validate_api_key(var: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(anyhow!(format!("{var} is empty")));
    }
    if var.contains("OPENAI") && !value.starts_with("sk-") {
        return Err(anyhow!(format!(
            "{} must start with 'sk-' (see https://platform.openai.com/)",
            var
        )));
    }
    if var.starts_with("HF_") && !value.starts_with("hf_") {
        return Err(anyhow!(format!("{} must start with 'hf_'", var)));
    }
    Ok(())
}

#[derive(Default, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}
