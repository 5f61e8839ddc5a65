use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationConstraints, LlmError, LlmProvider};

const ANTHROPIC_BEDROCK_VERSION: &str = "bedrock-2023-05-31";

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    anthropic_version: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicResponse {
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

/// Anthropic models on AWS Bedrock via `InvokeModel`.
/// Credentials come from the default AWS provider chain.
#[derive(Clone)]
pub struct BedrockProvider {
    client: Client,
    model_id: String,
}

impl BedrockProvider {
    pub async fn from_region(region: &str, model_id: String) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&sdk_config),
            model_id,
        }
    }
}

fn request_body(prompt: &str, constraints: &GenerationConstraints) -> Result<Vec<u8>, LlmError> {
    let request = AnthropicRequest {
        anthropic_version: ANTHROPIC_BEDROCK_VERSION,
        max_tokens: constraints.max_tokens,
        temperature: constraints.temperature,
        system: constraints.system.as_deref(),
        messages: vec![AnthropicMessage {
            role: "user",
            content: prompt,
        }],
    };
    Ok(serde_json::to_vec(&request)?)
}

fn parse_response(bytes: &[u8]) -> Result<String, LlmError> {
    let response: AnthropicResponse = serde_json::from_slice(bytes)?;
    if let Some(usage) = &response.usage {
        debug!(
            "Bedrock call succeeded: input_tokens={}, output_tokens={}",
            usage.input_tokens, usage.output_tokens
        );
    }
    response
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(LlmError::EmptyContent)
}

#[async_trait]
impl LlmProvider for BedrockProvider {
    fn name(&self) -> &'static str {
        "bedrock"
    }

    async fn generate(
        &self,
        prompt: &str,
        constraints: &GenerationConstraints,
    ) -> Result<String, LlmError> {
        let output = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(request_body(prompt, constraints)?))
            .send()
            .await
            .map_err(|e| LlmError::Provider(DisplayErrorContext(&e).to_string()))?;

        parse_response(output.body().as_ref())
    }
}
