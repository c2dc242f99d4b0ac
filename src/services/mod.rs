pub mod translation;

// Re-export commonly used services
pub use translation::{ProviderRegistry, TranslationCache, TranslationProvider};
