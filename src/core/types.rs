use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::errors::FailureKind;

/// Remote translation backend.
///
/// Persisted as `primary` / `secondary` / `neural`; the backend names used by
/// older key files (`gemini`, `deepinfra`, `nllb`) are accepted on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    #[serde(alias = "gemini")]
    Primary,
    #[serde(alias = "deepinfra")]
    Secondary,
    #[serde(alias = "nllb")]
    Neural,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::Primary, ProviderId::Secondary, ProviderId::Neural];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Primary => "primary",
            ProviderId::Secondary => "secondary",
            ProviderId::Neural => "neural",
        }
    }

    /// Method tag reported to callers for results served by this provider
    pub fn method(self) -> TranslationMethod {
        match self {
            ProviderId::Primary => TranslationMethod::PrimaryProvider,
            ProviderId::Secondary => TranslationMethod::SecondaryProvider,
            ProviderId::Neural => TranslationMethod::NeuralFallback,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a result was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMethod {
    PrimaryProvider,
    SecondaryProvider,
    NeuralFallback,
    Cache,
    Original,
}

impl TranslationMethod {
    pub fn provider(self) -> Option<ProviderId> {
        match self {
            TranslationMethod::PrimaryProvider => Some(ProviderId::Primary),
            TranslationMethod::SecondaryProvider => Some(ProviderId::Secondary),
            TranslationMethod::NeuralFallback => Some(ProviderId::Neural),
            TranslationMethod::Cache | TranslationMethod::Original => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TranslationMethod::PrimaryProvider => "primary_provider",
            TranslationMethod::SecondaryProvider => "secondary_provider",
            TranslationMethod::NeuralFallback => "neural_fallback",
            TranslationMethod::Cache => "cache",
            TranslationMethod::Original => "original",
        }
    }
}

/// Fixed provider order consulted when no usable preference is given
pub const FALLBACK_CHAIN: [TranslationMethod; 3] = [
    TranslationMethod::PrimaryProvider,
    TranslationMethod::SecondaryProvider,
    TranslationMethod::NeuralFallback,
];

/// Ordered list of providers a sub-batch walks through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChain {
    providers: Vec<ProviderId>,
}

impl FallbackChain {
    /// Preferred provider first (when it names one), then the fixed chain
    /// without duplicates. `Cache` and `Original` preferences are ignored.
    pub fn with_preference(preferred: Option<TranslationMethod>) -> Self {
        let mut providers = Vec::with_capacity(FALLBACK_CHAIN.len());
        if let Some(first) = preferred.and_then(TranslationMethod::provider) {
            providers.push(first);
        }
        for method in FALLBACK_CHAIN {
            if let Some(provider) = method.provider() {
                if !providers.contains(&provider) {
                    providers.push(provider);
                }
            }
        }
        Self { providers }
    }

    pub fn providers(&self) -> &[ProviderId] {
        &self.providers
    }
}

impl Default for FallbackChain {
    fn default() -> Self {
        Self::with_preference(None)
    }
}

/// Register of speech
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Formality {
    Casual,
    Polite,
    #[default]
    Neutral,
}

impl Formality {
    pub fn as_str(self) -> &'static str {
        match self {
            Formality::Casual => "casual",
            Formality::Polite => "polite",
            Formality::Neutral => "neutral",
        }
    }
}

/// Scene metadata supplied by the OCR/segmentation side.
///
/// Tone fields (formality, relationship, emotion, thought, sfx) change the
/// translation and are part of the cache fingerprint. `is_mega_batch` and
/// `total_images` only describe the workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationContext {
    pub formality: Formality,
    pub relationship: String,
    pub emotion: String,
    #[serde(alias = "isThought")]
    pub is_thought: bool,
    #[serde(alias = "isSfx")]
    pub is_sfx: bool,
    #[serde(alias = "isMegaBatch")]
    pub is_mega_batch: bool,
    #[serde(alias = "totalImages")]
    pub total_images: u32,
    /// Extra instructions appended to the provider prompt
    #[serde(alias = "customPrompt", skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

impl TranslationContext {
    /// Stable serialization of the fields that change a translation, used in
    /// cache fingerprints.
    ///
    /// `is_mega_batch` and `total_images` are left out on purpose. They only add
    /// a consistency note to the prompt, so a line translated inside a
    /// mega-batch is served from cache to a single-page request and vice versa.
    pub fn tone_signature(&self) -> String {
        let mut signature = format!(
            "{}|{}|{}|{}|{}",
            self.formality.as_str(),
            self.relationship.trim().to_lowercase(),
            self.emotion.trim().to_lowercase(),
            self.is_thought,
            self.is_sfx
        );
        if let Some(prompt) = self.custom_prompt() {
            signature.push('|');
            signature.push_str(prompt);
        }
        signature
    }

    /// Trimmed custom prompt, `None` when unset or blank
    pub fn custom_prompt(&self) -> Option<&str> {
        self.custom_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn has_tone(&self) -> bool {
        self.formality != Formality::Neutral
            || !self.relationship.trim().is_empty()
            || !self.emotion.trim().is_empty()
            || self.is_thought
            || self.is_sfx
            || self.custom_prompt().is_some()
    }
}

fn default_source_lang() -> String {
    "auto".to_string()
}

/// Ordered batch of bubble texts to translate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub texts: Vec<String>,
    #[serde(default = "default_source_lang", alias = "sourceLang")]
    pub source_lang: String,
    #[serde(default)]
    pub context: Option<TranslationContext>,
    #[serde(default, alias = "preferredMethod")]
    pub preferred_method: Option<TranslationMethod>,
    #[serde(default, alias = "customPrompt")]
    pub custom_prompt: Option<String>,
}

impl TranslationRequest {
    pub fn new(texts: Vec<String>, source_lang: impl Into<String>) -> Self {
        Self {
            texts,
            source_lang: source_lang.into(),
            context: None,
            preferred_method: None,
            custom_prompt: None,
        }
    }

    pub fn with_context(mut self, context: TranslationContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_preferred_method(mut self, method: TranslationMethod) -> Self {
        self.preferred_method = Some(method);
        self
    }

    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }

    /// Context handed to providers and the cache. A request-level custom
    /// prompt overrides one set inside the context.
    pub fn effective_context(&self) -> Option<TranslationContext> {
        match (&self.context, &self.custom_prompt) {
            (ctx, None) => ctx.clone(),
            (ctx, Some(prompt)) => {
                let mut ctx = ctx.clone().unwrap_or_default();
                ctx.custom_prompt = Some(prompt.clone());
                Some(ctx)
            }
        }
    }
}

/// One output per input, same order as the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub text: String,
    pub method_used: TranslationMethod,
    pub cache_hit: bool,
}

impl TranslationResult {
    pub fn original(text: &str) -> Self {
        Self {
            text: text.to_string(),
            method_used: TranslationMethod::Original,
            cache_hit: false,
        }
    }

    pub fn cached(text: String) -> Self {
        Self {
            text,
            method_used: TranslationMethod::Cache,
            cache_hit: true,
        }
    }

    pub fn translated(text: String, provider: ProviderId) -> Self {
        Self {
            text,
            method_used: provider.method(),
            cache_hit: false,
        }
    }
}

/// Outcome of a health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthKind {
    Healthy,
    Unauthorized,
    Forbidden,
    RateLimited,
    Unreachable,
}

impl HealthKind {
    /// Probe classification of a failed call. Quota exhaustion surfaces as a
    /// throttle, a malformed answer as an unreachable provider.
    pub fn from_failure(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Unauthorized => HealthKind::Unauthorized,
            FailureKind::Forbidden => HealthKind::Forbidden,
            FailureKind::QuotaExceeded | FailureKind::RateLimited => HealthKind::RateLimited,
            FailureKind::Unreachable | FailureKind::InvalidResponse => HealthKind::Unreachable,
        }
    }

    pub fn as_failure(self) -> Option<FailureKind> {
        match self {
            HealthKind::Healthy => None,
            HealthKind::Unauthorized => Some(FailureKind::Unauthorized),
            HealthKind::Forbidden => Some(FailureKind::Forbidden),
            HealthKind::RateLimited => Some(FailureKind::RateLimited),
            HealthKind::Unreachable => Some(FailureKind::Unreachable),
        }
    }
}
