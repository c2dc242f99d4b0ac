// HTTP plumbing shared by the provider adapters

use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::time::Duration;

use crate::core::errors::ProviderError;
use crate::core::types::ProviderId;

/// Client shared by all adapters. Per-call deadlines are enforced by the
/// dispatcher and the health checker; this timeout is only a backstop.
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to create HTTP client")
}

/// Map a non-success response onto the failure taxonomy
pub fn classify_status(
    provider: ProviderId,
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> ProviderError {
    let lowered = body.to_lowercase();
    let message = truncate(body, 200);

    match status.as_u16() {
        401 => ProviderError::Unauthorized {
            provider,
            status: 401,
            message,
        },
        403 => ProviderError::Forbidden { provider, message },
        400 if lowered.contains("api key not valid")
            || lowered.contains("api_key_invalid")
            || lowered.contains("invalid api key") =>
        {
            ProviderError::Unauthorized {
                provider,
                status: 400,
                message,
            }
        }
        429 if lowered.contains("per day")
            || lowered.contains("perday")
            || lowered.contains("daily") =>
        {
            ProviderError::QuotaExceeded { provider, message }
        }
        429 => ProviderError::RateLimited {
            provider,
            retry_after,
        },
        408 => ProviderError::Unreachable { provider, message },
        s if (500..600).contains(&s) => ProviderError::Unreachable {
            provider,
            message: format!("HTTP {}: {}", s, message),
        },
        s => ProviderError::InvalidResponse {
            provider,
            message: format!("HTTP {}: {}", s, message),
        },
    }
}

/// Transport errors: timeouts and connection failures mean the provider is unreachable
pub fn classify_transport(provider: ProviderId, err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ProviderError::Unreachable {
            provider,
            message: err.to_string(),
        }
    } else if err.is_decode() || err.is_body() {
        ProviderError::invalid(provider, err.to_string())
    } else {
        ProviderError::Unreachable {
            provider,
            message: err.to_string(),
        }
    }
}

/// Send a request and return the body of a successful response
pub async fn send(provider: ProviderId, request: reqwest::RequestBuilder) -> Result<String, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(provider, &e))?;

    let status = response.status();
    if status.is_success() {
        return response
            .text()
            .await
            .map_err(|e| classify_transport(provider, &e));
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(provider, status, &body, retry_after))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
