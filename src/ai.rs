//! A small client for Gemini's `generateContent` endpoint. One prompt in, one text answer out.

use serde::{Deserialize, Serialize};

use crate::config::AiConfig;

#[derive(Debug, thiserror::Error)]
pub(crate) enum AiError {
    #[error("request to the AI service failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("the AI service answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("the AI service returned no text")]
    Empty,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn new(prompt: &'a str) -> Self {
        Self {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text parts of the first candidate, joined and trimmed.
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

pub(crate) struct AiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl AiClient {
    /// `None` when no API key is configured.
    pub(crate) fn from_config(http: reqwest::Client, config: &AiConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            http,
            api_key,
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/{}:generateContent", self.endpoint, self.model)
    }

    pub(crate) async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let resp = self
            .http
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&GenerateRequest::new(prompt))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<GenerateResponse>()
            .await?
            .text()
            .ok_or(AiError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let body = serde_json::to_value(GenerateRequest::new("hello")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"contents": [{"parts": [{"text": "hello"}]}]})
        );
    }

    #[test]
    fn test_response_text() {
        let raw = r#"{
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "  CORRECTED: I am"}, {"text": " here.\n"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"#;
        let resp: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.text().as_deref(), Some("CORRECTED: I am here."));
    }

    #[test]
    fn test_blocked_response_has_no_text() {
        let blocked: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert_eq!(blocked.text(), None);
        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.text(), None);
    }

    #[test]
    fn test_url_and_missing_key() {
        let mut config = AiConfig {
            api_key: None,
            model: "gemini-1.5-flash".into(),
            endpoint: "https://example.com/v1beta/models/".into(),
        };
        assert!(AiClient::from_config(reqwest::Client::new(), &config).is_none());
        config.api_key = Some("k".into());
        let client = AiClient::from_config(reqwest::Client::new(), &config).unwrap();
        assert_eq!(
            client.url(),
            "https://example.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }
}
