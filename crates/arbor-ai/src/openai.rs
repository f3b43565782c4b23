use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::warn;

use crate::retry::{
    is_retryable_http_error, new_request_id, next_backoff_ms, should_retry_status,
};
use crate::{
    AiError, ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, Message, MessageRole,
};

/// How the API key is presented to the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenAiAuthScheme {
    #[default]
    Bearer,
    /// `api-key` header, as Azure-hosted deployments expect.
    ApiKeyHeader,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL up to (but not including) `/chat/completions`.
    pub api_base: String,
    pub api_key: String,
    pub auth_scheme: OpenAiAuthScheme,
    /// Appended as an `api-version` query parameter when set.
    pub api_version: Option<String>,
    pub request_timeout_ms: u64,
    /// Additional attempts after the first.
    pub max_retries: usize,
}

/// Chat-completions client for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, AiError> {
        if config.api_key.trim().is_empty() {
            return Err(AiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match config.auth_scheme {
            OpenAiAuthScheme::Bearer => {
                let bearer = format!("Bearer {}", config.api_key.trim());
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&bearer).map_err(|error| {
                        AiError::InvalidResponse(format!("invalid API key header: {error}"))
                    })?,
                );
            }
            OpenAiAuthScheme::ApiKeyHeader => {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(config.api_key.trim()).map_err(|error| {
                        AiError::InvalidResponse(format!("invalid API key header: {error}"))
                    })?,
                );
            }
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }

        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, AiError> {
        let body = build_chat_request_body(&request);
        let url = self.chat_completions_url();
        let max_retries = self.config.max_retries;

        for attempt in 0..=max_retries {
            let request_id = new_request_id();
            let mut request_builder = self
                .client
                .post(&url)
                .header("x-arbor-request-id", request_id)
                .header("x-arbor-retry-attempt", attempt.to_string());
            if let Some(api_version) = self.config.api_version.as_deref() {
                request_builder = request_builder.query(&[("api-version", api_version)]);
            }
            let response = request_builder.json(&body).send().await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    let raw = response.text().await?;
                    if status.is_success() {
                        return parse_chat_response(&raw);
                    }

                    if attempt < max_retries && should_retry_status(status.as_u16()) {
                        let backoff_ms = next_backoff_ms(attempt);
                        warn!(
                            status = status.as_u16(),
                            attempt = attempt + 1,
                            backoff_ms,
                            "completion endpoint returned retryable status"
                        );
                        sleep(std::time::Duration::from_millis(backoff_ms)).await;
                        continue;
                    }

                    return Err(AiError::HttpStatus {
                        status: status.as_u16(),
                        body: raw,
                    });
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_http_error(&error) {
                        let backoff_ms = next_backoff_ms(attempt);
                        warn!(
                            attempt = attempt + 1,
                            backoff_ms,
                            %error,
                            "completion request failed, retrying"
                        );
                        sleep(std::time::Duration::from_millis(backoff_ms)).await;
                        continue;
                    }
                    return Err(AiError::Http(error));
                }
            }
        }

        Err(AiError::InvalidResponse(
            "request retry loop terminated unexpectedly".to_string(),
        ))
    }
}

fn build_chat_request_body(request: &ChatRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": to_openai_messages(&request.messages),
    });

    if !request.tools.is_empty() {
        body["tools"] = to_openai_tools(request);
        body["tool_choice"] = json!("auto");
    }

    if let Some(max_tokens) = request.max_tokens {
        body["max_completion_tokens"] = json!(max_tokens);
    }

    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }

    body
}

fn to_openai_tools(request: &ChatRequest) -> Value {
    Value::Array(
        request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect(),
    )
}

fn to_openai_messages(messages: &[Message]) -> Vec<Value> {
    let mut serialized = Vec::new();

    for message in messages {
        match message.role {
            MessageRole::System => serialized.push(json!({
                "role": "system",
                "content": message.text_content(),
            })),
            MessageRole::User => serialized.push(json!({
                "role": "user",
                "content": message.text_content(),
            })),
            MessageRole::Assistant => {
                let tool_calls: Vec<Value> = message
                    .tool_calls()
                    .into_iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": stringify_tool_arguments(&call.arguments),
                            }
                        })
                    })
                    .collect();

                let text = message.text_content();
                let content = if text.trim().is_empty() && !tool_calls.is_empty() {
                    Value::Null
                } else {
                    Value::String(text)
                };

                if tool_calls.is_empty() {
                    serialized.push(json!({
                        "role": "assistant",
                        "content": content,
                    }));
                } else {
                    serialized.push(json!({
                        "role": "assistant",
                        "content": content,
                        "tool_calls": tool_calls,
                    }));
                }
            }
            MessageRole::Tool => {
                let mut tool_message = json!({
                    "role": "tool",
                    "tool_call_id": message.tool_call_id,
                    "content": message.text_content(),
                });
                if let Some(name) = &message.tool_name {
                    tool_message["name"] = Value::String(name.clone());
                }
                serialized.push(tool_message);
            }
        }
    }

    serialized
}

/// Tool-call argument text is replayed to the endpoint verbatim when it was
/// preserved as a string; structured values are re-rendered.
fn stringify_tool_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(value) => value.clone(),
        value => value.to_string(),
    }
}

#[derive(Deserialize)]
struct ApiChatResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

fn parse_chat_response(raw: &str) -> Result<ChatResponse, AiError> {
    let parsed: ApiChatResponse = serde_json::from_str(raw)?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AiError::InvalidResponse("response contained no choices".to_string()))?;

    let mut content = parse_content_blocks(choice.message.content.as_ref());

    if let Some(tool_calls) = choice.message.tool_calls {
        for tool_call in tool_calls {
            if tool_call.call_type != "function" {
                continue;
            }

            // The argument text stays verbatim so history replay is
            // byte-identical; the dispatcher parses it lazily and reports
            // any JSON failure itself.
            content.push(ContentBlock::ToolCall {
                id: tool_call.id,
                name: tool_call.function.name,
                arguments: Value::String(tool_call.function.arguments),
            });
        }
    }

    let usage = parsed
        .usage
        .map(|usage| ChatUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        message: Message {
            role: MessageRole::Assistant,
            content,
            tool_call_id: None,
            tool_name: None,
            is_error: false,
        },
        finish_reason: choice.finish_reason,
        usage,
    })
}

fn parse_content_blocks(content: Option<&Value>) -> Vec<ContentBlock> {
    match content {
        Some(Value::String(text)) if !text.is_empty() => vec![ContentBlock::Text {
            text: text.clone(),
        }],
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| {
                part.get("text")
                    .and_then(Value::as_str)
                    .map(|text| ContentBlock::Text {
                        text: text.to_string(),
                    })
            })
            .collect(),
        _ => Vec::new(),
    }
}
