//! External live-coding music generator used by `generateStrudelCode`.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the external generator.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// Building the HTTP client failed.
    #[error("failed to build generator client: {0}")]
    Client(String),
    /// The request could not be sent or the response not read.
    #[error("generator request failed: {0}")]
    Request(String),
    /// The generator answered with a non-success status.
    #[error("generator responded with status {0}")]
    Status(u16),
    /// The generator answered without usable code.
    #[error("generator returned no code")]
    EmptyCode,
}

/// What the generator is asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub room_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    code: Option<String>,
}

/// Produces strudel code for a prompt. Called outside of the room actor.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'static, Result<String, GeneratorError>>;
}

#[cfg(feature = "strudel-http")]
pub use http::HttpCodeGenerator;

#[cfg(feature = "strudel-http")]
mod http {
    use std::{sync::Arc, time::Duration};

    use futures::future::BoxFuture;
    use reqwest::Client;

    use super::{CodeGenerator, GenerationRequest, GenerationResponse, GeneratorError};

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Posts `GenerationRequest` as JSON and expects `{ "code": ... }` back.
    #[derive(Clone)]
    pub struct HttpCodeGenerator {
        client: Client,
        endpoint: Arc<str>,
    }

    impl HttpCodeGenerator {
        pub fn new(endpoint: &str) -> Result<Self, GeneratorError> {
            let client = Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .map_err(|err| GeneratorError::Client(err.to_string()))?;
            Ok(Self {
                client,
                endpoint: Arc::from(endpoint.trim_end_matches('/')),
            })
        }
    }

    impl CodeGenerator for HttpCodeGenerator {
        fn generate(
            &self,
            request: GenerationRequest,
        ) -> BoxFuture<'static, Result<String, GeneratorError>> {
            let client = self.client.clone();
            let endpoint = self.endpoint.clone();
            Box::pin(async move {
                let response = client
                    .post(endpoint.as_ref())
                    .json(&request)
                    .send()
                    .await
                    .map_err(|err| GeneratorError::Request(err.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(GeneratorError::Status(status.as_u16()));
                }

                let body: GenerationResponse = response
                    .json()
                    .await
                    .map_err(|err| GeneratorError::Request(err.to_string()))?;
                body.code
                    .filter(|code| !code.trim().is_empty())
                    .ok_or(GeneratorError::EmptyCode)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_omits_missing_fields() {
        let request = GenerationRequest {
            room_key: "ABC123".into(),
            prompt: Some("lofi".into()),
            style: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"roomKey": "ABC123", "prompt": "lofi"})
        );
    }

    #[test]
    fn response_code_is_optional() {
        let body: GenerationResponse = serde_json::from_str("{}").unwrap();
        assert!(body.code.is_none());
    }
}
