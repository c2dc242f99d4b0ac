// DeepInfra adapter (secondary provider)
//
// OpenAI-compatible chat/completions endpoint hosting Gemma. The public
// proxy needs no credential; a bearer token is sent only when the key record
// carries one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::config::ProviderConfig;
use crate::core::errors::{ProviderError, ProviderResult};
use crate::core::types::{ProviderId, TranslationContext};
use crate::services::translation::http;
use crate::services::translation::provider::{
    align_by_id, numbered_input, strip_code_fence, system_prompt, TranslationProvider,
    TranslationsResponse,
};

const PROVIDER: ProviderId = ProviderId::Secondary;

pub struct DeepInfraProvider {
    http_client: reqwest::Client,
    url: String,
    model: String,
    max_batch: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl DeepInfraProvider {
    pub fn new(http_client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            http_client,
            url: config.deepinfra_url.clone(),
            model: config.deepinfra_model.clone(),
            max_batch: config.deepinfra_max_batch,
        }
    }

    fn build_request(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
        context: Option<&TranslationContext>,
    ) -> ChatCompletionRequest<'_> {
        let system = format!(
            "{} Answer with JSON only: {{\"translations\": [{{\"id\": <id>, \"text\": <translation>}}]}}.",
            system_prompt(source_lang, target_lang, context)
        );

        ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: numbered_input(texts),
                },
            ],
            stream: false,
            temperature: 0.3,
            max_tokens: 4096,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        }
    }

    async fn complete(&self, credential: &str, request: &ChatCompletionRequest<'_>) -> ProviderResult<String> {
        let mut builder = self
            .http_client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(request);
        if !credential.is_empty() {
            builder = builder.bearer_auth(credential);
        }

        let body = http::send(PROVIDER, builder).await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::invalid(PROVIDER, format!("bad completion JSON: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "completion has no content"))
    }
}

#[async_trait]
impl TranslationProvider for DeepInfraProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    #[instrument(skip_all, fields(provider = "secondary", batch_size = texts.len()))]
    async fn translate(
        &self,
        credential: &str,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
        context: Option<&TranslationContext>,
    ) -> ProviderResult<Vec<Option<String>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = self.build_request(texts, source_lang, target_lang, context);
        let content = self.complete(credential, &request).await?;

        let parsed: TranslationsResponse = serde_json::from_str(strip_code_fence(&content))
            .map_err(|e| ProviderError::invalid(PROVIDER, format!("bad translations JSON: {}", e)))?;

        let slots = align_by_id(parsed.translations, texts.len());
        debug!(
            "DeepInfra answered {}/{} items",
            slots.iter().filter(|s| s.is_some()).count(),
            texts.len()
        );
        Ok(slots)
    }

    async fn probe(&self, credential: &str) -> ProviderResult<()> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: "ping".to_string(),
            }],
            stream: false,
            temperature: 0.0,
            max_tokens: 1,
            response_format: ResponseFormat {
                format_type: "text",
            },
        };
        self.complete(credential, &request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;

    #[test]
    fn test_request_shape() {
        let provider = DeepInfraProvider::new(reqwest::Client::new(), &Config::default().providers);
        let request = provider.build_request(&["안녕".to_string()], "ko", "vi", None);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "google/gemma-3-27b-it");
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(json["messages"][0]["content"].as_str().unwrap().contains("Korean"));
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_completion_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"```json\n{\"translations\":[{\"id\":1,\"text\":\"Chào\"}]}\n```"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        let content = parsed.choices[0].message.content.clone().unwrap();
        let translations: TranslationsResponse =
            serde_json::from_str(strip_code_fence(&content)).unwrap();
        assert_eq!(
            align_by_id(translations.translations, 1),
            vec![Some("Chào".to_string())]
        );
    }
}
