use anyhow::Result;
use async_trait::async_trait;
use tessera_llm::{LlmClient, LlmRequest};

use crate::ports::Generator;

/// [`Generator`] backed by one of the `tessera_llm` providers.
pub struct LlmGenerator {
    client: LlmClient,
}

impl LlmGenerator {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.client.chat(&LlmRequest::user(prompt)).await?;
        Ok(response.content)
    }

    fn name(&self) -> &str {
        self.client.provider().as_str()
    }

    fn is_real(&self) -> bool {
        self.client.provider().is_real()
    }

    async fn health(&self) -> bool {
        self.client.health().await
    }
}
