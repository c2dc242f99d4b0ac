// Translation backends behind one trait
//
// An adapter makes exactly one remote call per `translate`. Key selection,
// retries and fallback live in the dispatcher.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::errors::ProviderResult;
use crate::core::types::{Formality, ProviderId, TranslationContext};

#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Largest number of texts accepted in one call
    fn max_batch_size(&self) -> usize;

    /// Translate `texts` with one call. The returned vector has exactly one
    /// slot per input; `None` marks an item the provider left unanswered.
    async fn translate(
        &self,
        credential: &str,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
        context: Option<&TranslationContext>,
    ) -> ProviderResult<Vec<Option<String>>>;

    /// Cheapest request that proves the credential works
    async fn probe(&self, credential: &str) -> ProviderResult<()>;
}

/// Registered adapters, looked up by provider id
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderId, Arc<dyn TranslationProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn TranslationProvider>) {
        self.providers.insert(provider.id(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn TranslationProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, id: ProviderId) -> Option<&Arc<dyn TranslationProvider>> {
        self.providers.get(&id)
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<_> = self.providers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Smallest batch ceiling among the registered providers in `chain`
    pub fn smallest_ceiling(&self, chain: &[ProviderId]) -> Option<usize> {
        chain
            .iter()
            .filter_map(|id| self.get(*id))
            .map(|p| p.max_batch_size())
            .min()
    }
}

pub(crate) fn language_name(code: &str) -> &str {
    match code {
        "ja" => "Japanese",
        "zh" | "zh-cn" => "Chinese",
        "ko" => "Korean",
        "en" => "English",
        "vi" => "Vietnamese",
        "auto" => "the detected source language",
        other => other,
    }
}

/// Style notes for the tone fields that are set
pub(crate) fn context_notes(context: Option<&TranslationContext>) -> Vec<String> {
    let Some(ctx) = context else {
        return Vec::new();
    };

    let mut notes = Vec::new();
    match ctx.formality {
        Formality::Polite => notes.push("Use polite, respectful address.".to_string()),
        Formality::Casual => notes.push("Use casual, everyday speech.".to_string()),
        Formality::Neutral => {}
    }
    if !ctx.relationship.trim().is_empty() {
        notes.push(format!(
            "Speakers' relationship: {}. Choose pronouns accordingly.",
            ctx.relationship.trim()
        ));
    }
    if !ctx.emotion.trim().is_empty() {
        notes.push(format!("Emotion: {}.", ctx.emotion.trim()));
    }
    if ctx.is_thought {
        notes.push("These are inner thoughts, not spoken lines.".to_string());
    }
    if ctx.is_sfx {
        notes.push("These are sound effects: keep them short and punchy.".to_string());
    }
    if ctx.is_mega_batch {
        notes.push(format!(
            "Lines come from a {}-page series: keep names and forms of address consistent.",
            ctx.total_images.max(1)
        ));
    }
    if let Some(prompt) = ctx.custom_prompt() {
        notes.push(format!("Additional instructions: {}", prompt));
    }
    notes
}

/// System instruction shared by the chat-style providers
pub(crate) fn system_prompt(
    source_lang: &str,
    target_lang: &str,
    context: Option<&TranslationContext>,
) -> String {
    let mut prompt = format!(
        "You translate comic speech bubbles from {} to {}. \
         Translate each text naturally, fixing obvious OCR errors. \
         Keep it short enough for a speech bubble. \
         Do not add explanations. Return every id exactly once.",
        language_name(source_lang),
        language_name(target_lang)
    );
    for note in context_notes(context) {
        prompt.push(' ');
        prompt.push_str(&note);
    }
    prompt
}

/// Numbered input in the `[{"id": 1, "text": ...}]` layout the schema echoes
pub(crate) fn numbered_input(texts: &[String]) -> String {
    let items: Vec<serde_json::Value> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| serde_json::json!({"id": i + 1, "text": text}))
        .collect();
    serde_json::Value::Array(items).to_string()
}

pub(crate) fn translation_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "translations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "integer"},
                        "text": {"type": "string"}
                    },
                    "required": ["id", "text"]
                }
            }
        },
        "required": ["translations"]
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct TranslationsResponse {
    pub translations: Vec<TranslationItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TranslationItem {
    pub id: usize,
    pub text: String,
}

/// Place 1-based `{id, text}` answers into slots; blanks and unknown ids are dropped
pub(crate) fn align_by_id(items: Vec<TranslationItem>, expected: usize) -> Vec<Option<String>> {
    let mut slots = vec![None; expected];
    for item in items {
        let text = item.text.trim();
        if text.is_empty() || item.id == 0 || item.id > expected {
            continue;
        }
        slots[item.id - 1] = Some(text.to_string());
    }
    slots
}

/// Strip a ```json fence some models wrap around structured output
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
