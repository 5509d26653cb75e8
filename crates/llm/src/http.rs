//! Plumbing shared by the HTTP adapters.

use chorus_common::{ChorusError, Result};
use serde::de::DeserializeOwned;

/// The credential an adapter was built with, or a configuration error naming
/// the environment variable that should supply it.
pub(crate) fn require_key<'a>(
    key: &'a Option<String>,
    provider: &str,
    env_var: &str,
) -> Result<&'a str> {
    match key.as_deref() {
        Some(k) if !k.trim().is_empty() => Ok(k),
        _ => Err(ChorusError::Config(format!(
            "{env_var} environment variable is not set ({provider})"
        ))),
    }
}

/// Send a prepared request and decode a successful JSON body.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| ChorusError::transport(provider, format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(ChorusError::provider(
            provider,
            format!("API error {status}: {body_text}"),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| ChorusError::provider(provider, format!("failed to parse response: {e}")))
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
