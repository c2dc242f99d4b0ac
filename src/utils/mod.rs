pub mod metrics;
pub mod text;

// Re-export commonly used items
pub use metrics::{Metrics, MetricsSnapshot};
pub use text::{mask_credential, normalize_source, polish_translation};
