//! Content classifiers used by the moderation pipeline.

use crate::domain::moderation::Classification;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Something that can score text for policy violations.
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    /// Short name recorded in moderation logs.
    fn name(&self) -> &str;

    /// False when no backing service is configured.
    fn enabled(&self) -> bool {
        true
    }

    async fn classify(&self, text: &str) -> anyhow::Result<Classification>;
}

/// Used when no moderation API key is configured: every text comes back clean.
#[derive(Debug, Default)]
pub struct DisabledClassifier;

#[async_trait]
impl ContentClassifier for DisabledClassifier {
    fn name(&self) -> &str {
        "disabled"
    }

    fn enabled(&self) -> bool {
        false
    }

    async fn classify(&self, _text: &str) -> anyhow::Result<Classification> {
        Ok(Classification::default())
    }
}

const MODERATION_MODEL: &str = "omni-moderation-latest";

/// OpenAI moderation endpoint client.
#[derive(Debug, Clone)]
pub struct OpenAiModerationClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    category_scores: BTreeMap<String, f64>,
}

impl OpenAiModerationClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ContentClassifier for OpenAiModerationClient {
    fn name(&self) -> &str {
        MODERATION_MODEL
    }

    async fn classify(&self, text: &str) -> anyhow::Result<Classification> {
        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": MODERATION_MODEL, "input": text }))
            .send()
            .await
            .context("moderation request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("moderation API returned {status}: {body}");
        }

        let parsed: ModerationResponse = resp
            .json()
            .await
            .context("moderation response was not valid JSON")?;
        parse_first_result(parsed)
    }
}

fn parse_first_result(resp: ModerationResponse) -> anyhow::Result<Classification> {
    let first = resp
        .results
        .into_iter()
        .next()
        .context("moderation response had no results")?;
    Ok(Classification {
        flagged: first.flagged,
        category_scores: first.category_scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openai_payload() {
        let raw = serde_json::json!({
            "id": "modr-1",
            "model": "omni-moderation-latest",
            "results": [{
                "flagged": true,
                "categories": { "hate": true, "violence": false },
                "category_scores": { "hate": 0.91, "violence": 0.02 }
            }]
        });
        let resp: ModerationResponse = serde_json::from_value(raw).unwrap();
        let c = parse_first_result(resp).unwrap();
        assert!(c.flagged);
        assert_eq!(c.top_category(), Some(("hate", 0.91)));
    }

    #[test]
    fn empty_results_are_an_error() {
        let resp: ModerationResponse = serde_json::from_value(serde_json::json!({ "results": [] })).unwrap();
        assert!(parse_first_result(resp).is_err());
    }

    #[tokio::test]
    async fn disabled_classifier_reports_clean() {
        let c = DisabledClassifier.classify("anything").await.unwrap();
        assert!(!c.flagged);
        assert!(!DisabledClassifier.enabled());
    }
}
