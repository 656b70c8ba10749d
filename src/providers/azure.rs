//! Azure OpenAI deployment of the Responses API.

use async_trait::async_trait;
use serde_json::Value;

use super::http::HttpClient;
use super::openai::{ResponsesBody, ResponsesProvider, ResponsesTransport};
use super::{EnvLookup, required};
use crate::error::ProviderError;

pub const DEFAULT_API_VERSION: &str = "2025-03-01-preview";
pub const DEFAULT_DEPLOYMENT: &str = "computer-use-preview";

pub type AzureProvider = ResponsesProvider<AzureTransport>;

pub struct AzureTransport {
    http: HttpClient,
    api_key: String,
    endpoint: String,
    api_version: String,
    deployment: String,
}

impl AzureTransport {
    pub fn new(
        http: HttpClient,
        api_key: String,
        endpoint: String,
        api_version: String,
        deployment: String,
    ) -> Self {
        Self {
            http,
            api_key,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version,
            deployment,
        }
    }

    /// `AZURE_API_KEY` plus either `AZURE_ENDPOINT` or `AZURE_RESOURCE_NAME`.
    pub fn from_env(http: HttpClient, env: EnvLookup<'_>) -> Result<Self, ProviderError> {
        let api_key = required(env, "AZURE_API_KEY")?;
        let endpoint = match env("AZURE_ENDPOINT") {
            Some(endpoint) => endpoint,
            None => format!(
                "https://{}.openai.azure.com",
                required(env, "AZURE_RESOURCE_NAME")?
            ),
        };
        Ok(Self::new(
            http,
            api_key,
            endpoint,
            env("AZURE_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            env("AZURE_DEPLOYMENT").unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string()),
        ))
    }

    pub fn url(&self) -> String {
        format!(
            "{}/openai/responses?api-version={}",
            self.endpoint, self.api_version
        )
    }
}

#[async_trait]
impl ResponsesTransport for AzureTransport {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn send(&self, mut body: ResponsesBody) -> Result<Value, ProviderError> {
        body.model = self.deployment.clone();
        let headers = [("api-key", self.api_key.clone())];
        self.http.post_json(&self.url(), &headers, &body).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::conversation::Turn;
    use crate::providers::http::RetryPolicy;
    use crate::providers::{Provider, ProviderContext};
    use crate::types::Dimensions;

    fn http() -> HttpClient {
        HttpClient::new(Duration::from_secs(5), RetryPolicy::default()).unwrap()
    }

    #[test]
    fn endpoint_from_resource_name() {
        let vars = HashMap::from([
            ("AZURE_API_KEY", "key"),
            ("AZURE_RESOURCE_NAME", "my-res"),
        ]);
        let env = |k: &str| vars.get(k).map(|v| v.to_string());
        let transport = AzureTransport::from_env(http(), &env).unwrap();
        assert_eq!(
            transport.url(),
            "https://my-res.openai.azure.com/openai/responses?api-version=2025-03-01-preview"
        );
    }

    #[test]
    fn resource_or_endpoint_is_required() {
        let env = |k: &str| (k == "AZURE_API_KEY").then(|| "key".to_string());
        assert!(matches!(
            AzureTransport::from_env(http(), &env),
            Err(ProviderError::Config(_))
        ));
    }

    #[tokio::test]
    async fn posts_with_api_key_and_deployment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/responses"))
            .and(query_param("api-version", "2025-03-01-preview"))
            .and(header("api-key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "resp_az",
                "output": [{"type": "message", "content": [{"type": "output_text", "text": "hi"}]}]
            })))
            .mount(&server)
            .await;

        let transport = AzureTransport::new(
            http(),
            "key".into(),
            server.uri(),
            DEFAULT_API_VERSION.into(),
            "my-deployment".into(),
        );
        let provider = ResponsesProvider::new(
            transport,
            ProviderContext {
                system_prompt: "sys".into(),
                dimensions: Dimensions::default(),
            },
        );
        let turn = provider.generate(&[Turn::user("hello")]).await.unwrap();
        assert_eq!(turn.text(), "hi");

        let body = server.received_requests().await.unwrap()[0]
            .body_json::<Value>()
            .unwrap();
        assert_eq!(body["model"], "my-deployment");
    }
}
