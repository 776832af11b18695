//! Inline-LLM extraction adapter, kept behind a small provider interface.
//!
//! An OpenAI chat-completions-compatible client usable against any
//! compatible endpoint (OpenAI itself, or a self-hosted gateway), narrowed
//! to the single JSON-mode chat call this pipeline needs; network/config
//! failures map onto this crate's own `Network`/`NotConfigured` error
//! variants since the taxonomy here has no dedicated LLM error class.

use serde::{Deserialize, Serialize};
use webpeel_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>, model: String) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(Error::NotConfigured("missing extract provider base_url".to_string()));
        }
        if model.trim().is_empty() {
            return Err(Error::NotConfigured("missing extract model".to_string()));
        }
        Ok(Self { client, base_url, api_key, model })
    }

    /// Build a client from `LlmExtractOptions`, defaulting to the public
    /// OpenAI endpoint unless `provider` names an alternate base URL.
    pub fn from_options(client: reqwest::Client, opts: &webpeel_core::LlmExtractOptions) -> Result<Self> {
        let base_url = match opts.provider.as_deref() {
            None | Some("openai") => "https://api.openai.com".to_string(),
            Some(other) => other.to_string(),
        };
        let api_key = opts.api_key.clone();
        let model = opts.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
        Self::new(client, base_url, api_key, model)
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Run a single JSON-mode chat completion: `system` carries the task
    /// framing, `user` carries the document content + the caller's prompt.
    pub async fn chat_json(&self, system: &str, user: &str, timeout_ms: u64) -> Result<String> {
        let req = ChatCompletionsRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            response_format: Some(ResponseFormat { kind: "json_object".to_string() }),
            stream: Some(false),
        };

        let mut rb = self
            .client
            .post(self.endpoint())
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb.json(&req).send().await.map_err(|e| Error::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Network(format!("extract provider HTTP {status}")));
        }

        let parsed: ChatCompletionsResponse = resp.json().await.map_err(|e| Error::Network(e.to_string()))?;
        Ok(parsed.choices.first().map(|c| c.message.content.clone()).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn system(content: &str) -> Self {
        Self { role: "system".to_string(), content: content.to_string() }
    }
    fn user(content: &str) -> Self {
        Self { role: "user".to_string(), content: content.to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Run the document-grounded extraction prompt: ask the model to answer
/// `prompt` against `content`, constrained to JSON output.
pub async fn extract_with_llm(
    client: &OpenAiCompatClient,
    content: &str,
    prompt: &str,
    timeout_ms: u64,
) -> Result<serde_json::Value> {
    let system = "You extract structured information from web page content. \
                  Respond with a single JSON object and nothing else.";
    let user = format!("Instruction: {prompt}\n\nContent:\n{content}");
    let raw = client.chat_json(system, &user, timeout_ms).await?;
    serde_json::from_str(&raw).map_err(|e| Error::Network(format!("extract provider returned non-JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_base_url() {
        let c = OpenAiCompatClient::new(reqwest::Client::new(), String::new(), None, "gpt-4o-mini".to_string());
        assert!(c.is_err());
    }

    #[test]
    fn from_options_defaults_to_openai_endpoint() {
        let opts = webpeel_core::LlmExtractOptions { prompt: "x".into(), provider: None, api_key: None, model: None };
        let c = OpenAiCompatClient::from_options(reqwest::Client::new(), &opts).unwrap();
        assert_eq!(c.base_url, "https://api.openai.com");
    }
}
