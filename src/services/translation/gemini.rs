// Gemini adapter (primary provider)
//
// One generateContent call per sub-batch with a response schema, so the
// model answers `{"translations": [{"id", "text"}]}` keyed by the 1-based
// position of each input.

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::core::config::ProviderConfig;
use crate::core::errors::{ProviderError, ProviderResult};
use crate::core::types::{ProviderId, TranslationContext};
use crate::services::translation::http;
use crate::services::translation::provider::{
    align_by_id, numbered_input, strip_code_fence, system_prompt, translation_schema,
    TranslationProvider, TranslationsResponse,
};

const PROVIDER: ProviderId = ProviderId::Primary;

pub struct GeminiProvider {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    max_batch: usize,
}

impl GeminiProvider {
    pub fn new(http_client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            http_client,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            max_batch: config.gemini_max_batch,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn request_body(
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
        context: Option<&TranslationContext>,
    ) -> serde_json::Value {
        serde_json::json!({
            "systemInstruction": {
                "parts": [{"text": system_prompt(source_lang, target_lang, context)}]
            },
            "contents": [{
                "role": "user",
                "parts": [{"text": numbered_input(texts)}]
            }],
            "generationConfig": {
                "temperature": 0.3,
                "response_mime_type": "application/json",
                "response_schema": translation_schema(),
                "thinkingConfig": {"thinking_budget": 0}
            }
        })
    }

    async fn generate(&self, credential: &str, body: &serde_json::Value) -> ProviderResult<serde_json::Value> {
        let request = self
            .http_client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header("X-goog-api-key", credential)
            .json(body);

        let text = http::send(PROVIDER, request).await?;
        serde_json::from_str(&text).map_err(|e| ProviderError::invalid(PROVIDER, e.to_string()))
    }
}

/// Text of the first candidate part
fn candidate_text(response: &serde_json::Value) -> ProviderResult<&str> {
    response["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or_else(|| {
            let reason = response["candidates"][0]["finishReason"]
                .as_str()
                .or_else(|| response["promptFeedback"]["blockReason"].as_str())
                .unwrap_or("no candidate text");
            ProviderError::invalid(PROVIDER, format!("missing text in response ({})", reason))
        })
}

#[async_trait]
impl TranslationProvider for GeminiProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    #[instrument(skip_all, fields(provider = "primary", batch_size = texts.len()))]
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

        let body = Self::request_body(texts, source_lang, target_lang, context);
        let response = self.generate(credential, &body).await?;
        let raw = candidate_text(&response)?;

        let parsed: TranslationsResponse = serde_json::from_str(strip_code_fence(raw))
            .map_err(|e| ProviderError::invalid(PROVIDER, format!("bad translations JSON: {}", e)))?;

        let slots = align_by_id(parsed.translations, texts.len());
        debug!(
            "Gemini answered {}/{} items",
            slots.iter().filter(|s| s.is_some()).count(),
            texts.len()
        );
        Ok(slots)
    }

    async fn probe(&self, credential: &str) -> ProviderResult<()> {
        let body = serde_json::json!({
            "contents": [{"parts": [{"text": "ping"}]}],
            "generationConfig": {"maxOutputTokens": 1}
        });
        self.generate(credential, &body).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::types::Formality;

    #[test]
    fn test_endpoint() {
        let mut config = Config::default().providers;
        config.gemini_base_url = "https://example.test/v1beta/".to_string();
        let provider = GeminiProvider::new(reqwest::Client::new(), &config);
        assert_eq!(
            provider.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash-lite:generateContent"
        );
    }

    #[test]
    fn test_request_body_carries_context_and_schema() {
        let ctx = TranslationContext {
            formality: Formality::Casual,
            ..Default::default()
        };
        let body = GeminiProvider::request_body(&["こんにちは".to_string()], "ja", "vi", Some(&ctx));

        let instruction = body["systemInstruction"]["parts"][0]["text"].as_str().unwrap();
        assert!(instruction.contains("Japanese"));
        assert!(instruction.contains("Vietnamese"));
        assert!(instruction.contains("casual"));
        assert_eq!(
            body["generationConfig"]["response_schema"]["required"][0],
            "translations"
        );
        assert!(body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("\"id\":1"));
    }

    #[test]
    fn test_candidate_text() {
        let ok = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "{\"translations\": []}"}]}}]
        });
        assert_eq!(candidate_text(&ok).unwrap(), "{\"translations\": []}");

        let blocked = serde_json::json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = candidate_text(&blocked).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
