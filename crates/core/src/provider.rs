use crate::error::ProviderError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

/// Connection details for an OpenAI-compatible model API.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    base_url: Url,
    api_key: Option<String>,
    client: Client,
}

impl ProviderEndpoint {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ProviderError> {
        let trimmed = base_url.trim();
        let with_slash = if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };

        Ok(Self {
            base_url: Url::parse(&with_slash)?,
            api_key: api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            client: Client::new(),
        })
    }

    /// Replaces the default HTTP client, e.g. to set timeouts or proxies.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn url(&self, path: &str) -> Result<Url, ProviderError> {
        Ok(self.base_url.join(path)?)
    }

    pub(crate) async fn post_json<B, R>(
        &self,
        provider: &str,
        path: &str,
        body: &B,
    ) -> Result<R, ProviderError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(self.url(path)?).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: provider.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::ProviderEndpoint;
    use crate::error::ProviderError;
    use crate::test_support::{StubReply, StubServer};
    use serde_json::{json, Value};

    #[test]
    fn joins_paths_under_versioned_base() -> Result<(), Box<dyn std::error::Error>> {
        let endpoint = ProviderEndpoint::new("https://api.openai.com/v1", None)?;
        assert_eq!(
            endpoint.url("embeddings")?.as_str(),
            "https://api.openai.com/v1/embeddings"
        );
        Ok(())
    }

    #[test]
    fn blank_api_key_is_ignored() -> Result<(), Box<dyn std::error::Error>> {
        let endpoint = ProviderEndpoint::new("http://localhost:8080/", Some("  ".to_string()))?;
        assert!(endpoint.api_key.is_none());
        Ok(())
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(ProviderEndpoint::new("not a url", None).is_err());
    }

    #[tokio::test]
    async fn non_success_status_becomes_status_error() -> Result<(), Box<dyn std::error::Error>> {
        let server =
            StubServer::start(|_| StubReply::status(503, r#"{"error":"upstream overloaded"}"#))
                .await?;
        let endpoint = server.endpoint(Some("sk-test"))?;

        let result = endpoint
            .post_json::<_, Value>("embeddings", "embeddings", &json!({ "input": "x" }))
            .await;

        match result {
            Err(ProviderError::Status {
                provider,
                status,
                body,
            }) => {
                assert_eq!(provider, "embeddings");
                assert_eq!(status, 503);
                assert!(body.contains("upstream overloaded"));
            }
            other => panic!("expected a status error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn sends_bearer_token_and_json_body() -> Result<(), Box<dyn std::error::Error>> {
        let server = StubServer::start(|_| StubReply::json(json!({ "ok": true }))).await?;
        let endpoint = server.endpoint(Some(" sk-live "))?;

        let reply: Value = endpoint
            .post_json("chat-completions", "chat/completions", &json!({ "model": "m" }))
            .await?;
        assert_eq!(reply["ok"], true);

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/v1/chat/completions");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer sk-live"));
        assert_eq!(requests[0].body["model"], "m");
        Ok(())
    }

    #[tokio::test]
    async fn undecodable_success_body_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let server = StubServer::start(|_| StubReply::status(200, "not json")).await?;
        let endpoint = server.endpoint(None)?;

        let result = endpoint
            .post_json::<_, Value>("embeddings", "embeddings", &json!({}))
            .await;
        assert!(matches!(result, Err(ProviderError::Http(_))));
        Ok(())
    }
}
