// NLLB adapter (neural machine translation fallback)
//
// The public endpoint translates one text per GET request and needs no
// credential. A sub-batch fans out into concurrent requests; items that fail
// or come back unchanged are left unanswered for the next provider.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::config::ProviderConfig;
use crate::core::errors::{ProviderError, ProviderResult};
use crate::core::types::{ProviderId, TranslationContext};
use crate::services::translation::http;
use crate::services::translation::provider::TranslationProvider;

const PROVIDER: ProviderId = ProviderId::Neural;

pub struct NllbProvider {
    http_client: reqwest::Client,
    url: String,
    max_batch: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NllbResponse {
    Result { result: String },
    Text { text: String },
    Bare(String),
}

impl NllbResponse {
    fn into_text(self) -> String {
        match self {
            NllbResponse::Result { result } => result,
            NllbResponse::Text { text } => text,
            NllbResponse::Bare(text) => text,
        }
    }
}

/// FLORES-200 code for a short language tag; unknown tags fall back to English
pub fn flores_code(lang: &str) -> &'static str {
    match lang {
        "ja" => "jpn_Jpan",
        "zh" | "zh-cn" => "zho_Hans",
        "zh-tw" => "zho_Hant",
        "ko" => "kor_Hang",
        "vi" => "vie_Latn",
        "fr" => "fra_Latn",
        "de" => "deu_Latn",
        "es" => "spa_Latn",
        _ => "eng_Latn",
    }
}

impl NllbProvider {
    pub fn new(http_client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            http_client,
            url: config.nllb_url.clone(),
            max_batch: config.nllb_max_batch,
        }
    }

    async fn translate_one(&self, text: &str, source: &str, target: &str) -> ProviderResult<String> {
        let request = self
            .http_client
            .get(&self.url)
            .query(&[("text", text), ("source", source), ("target", target)]);

        let body = http::send(PROVIDER, request).await?;
        let parsed: NllbResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::invalid(PROVIDER, format!("bad NLLB JSON: {}", e)))?;
        Ok(parsed.into_text().trim().to_string())
    }
}

#[async_trait]
impl TranslationProvider for NllbProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    #[instrument(skip_all, fields(provider = "neural", batch_size = texts.len()))]
    async fn translate(
        &self,
        _credential: &str,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
        _context: Option<&TranslationContext>,
    ) -> ProviderResult<Vec<Option<String>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let source = flores_code(source_lang);
        let target = flores_code(target_lang);
        let outcomes = join_all(texts.iter().map(|t| self.translate_one(t, source, target))).await;

        let mut slots = Vec::with_capacity(texts.len());
        let mut first_error = None;
        for (text, outcome) in texts.iter().zip(outcomes) {
            match outcome {
                Ok(translated) if !translated.is_empty() && translated != text.trim() => {
                    slots.push(Some(translated));
                }
                Ok(_) => slots.push(None),
                Err(e) => {
                    debug!("NLLB item failed: {}", e);
                    first_error.get_or_insert(e);
                    slots.push(None);
                }
            }
        }

        // Nothing came back: report why, so the key and breaker see the failure
        if slots.iter().all(Option::is_none) {
            if let Some(e) = first_error {
                return Err(e);
            }
        }
        Ok(slots)
    }

    async fn probe(&self, _credential: &str) -> ProviderResult<()> {
        self.translate_one("hello", "eng_Latn", "vie_Latn").await.map(|_| ())
    }
}
