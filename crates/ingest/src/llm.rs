//! HTTP extraction service client.
//!
//! Talks to any OpenAI-compatible chat-completions endpoint that accepts
//! inline documents as data URLs.

use crate::config::ExtractorConfig;
use crate::decode::EncodedDocument;
use crate::error::{ExtractionError, IngestError};
use crate::extraction::{build_prompt, parse_reply, InvoiceExtractor};
use crate::fields::Fields;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Extractor backed by a hosted language model.
pub struct HttpExtractor {
    client: Client,
    config: ExtractorConfig,
    api_key: String,
}

impl HttpExtractor {
    /// Build a client, reading the API key from the configured variable.
    pub fn new(config: ExtractorConfig) -> Result<Self, IngestError> {
        let api_key = config.api_key()?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: ExtractorConfig, api_key: String) -> Result<Self, IngestError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| IngestError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, document: &EncodedDocument, columns: &[String]) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: build_prompt(columns),
                    },
                    ContentPart::ImageUrl {
                        image_url: DataUrl {
                            url: document.as_str().to_string(),
                        },
                    },
                ],
            }],
            temperature: self.config.temperature,
        }
    }
}

#[async_trait]
impl InvoiceExtractor for HttpExtractor {
    async fn extract(
        &self,
        document: &EncodedDocument,
        columns: &[String],
    ) -> Result<Vec<Fields>, ExtractionError> {
        let request = self.request_body(document, columns);
        debug!(model = %self.config.model, document = %document, "sending extraction request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::MalformedResponse(format!("Invalid response body: {}", e)))?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ExtractionError::MalformedResponse("Response has no content".to_string()))?;

        parse_reply(&content)
    }
}

// API request/response types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: DataUrl },
}

#[derive(Debug, Serialize)]
struct DataUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaType;

    fn extractor(base_url: &str) -> HttpExtractor {
        let config = ExtractorConfig {
            base_url: base_url.to_string(),
            ..ExtractorConfig::default()
        };
        HttpExtractor::with_api_key(config, "test-key".to_string()).unwrap()
    }

    #[test]
    fn test_endpoint_trims_slash() {
        assert_eq!(
            extractor("http://localhost:8080/v1/").endpoint(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_body_carries_document() {
        let document = EncodedDocument::encode(b"%PDF", MediaType::Pdf);
        let columns = vec!["Invoice No".to_string()];
        let body = extractor("http://localhost").request_body(&document, &columns);

        let json = serde_json::to_value(&body).unwrap();
        let parts = json["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert!(parts[0]["text"].as_str().unwrap().contains("Invoice No"));
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], document.as_str());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"[{\"invoiceNo\":\"1\"}]"}}]}"#;
        let reply: ChatResponse = serde_json::from_str(raw).unwrap();
        let content = reply.choices[0].message.content.as_deref().unwrap();
        assert_eq!(parse_reply(content).unwrap().len(), 1);
    }
}
