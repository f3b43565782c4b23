//! Bounded conversation loop: repeatedly replays the growing turn history to
//! the controller model, dispatches any requested tool calls, and stops when
//! the assistant emits a final report.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use arbor_ai::retry::{is_retryable_ai_error, next_backoff_ms};
use arbor_ai::{AiError, ChatRequest, ChatResponse, LlmClient, Message, ToolCall};

use crate::report::{parse_final_report, FinalReport};
use crate::tools::{tool_definitions, ToolHandler, ToolResult};
use crate::OrchestratorError;

pub const DEFAULT_MAX_ITERATIONS: usize = 20;

const DEFAULT_MAX_TOKENS: u32 = 4000;
const DEFAULT_REQUEST_MAX_RETRIES: usize = 3;

/// Lifecycle callbacks. Headless runs attach no subscriber; interactive runs
/// attach one that prints, so both share the identical control loop.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    IterationStart {
        iteration: usize,
    },
    AssistantText {
        text: String,
    },
    ToolCallStart {
        name: String,
        arguments: String,
    },
    ToolCallEnd {
        name: String,
        result: ToolResult,
    },
    NotFinalYet,
    ReportReady,
}

pub type EventHandler = Arc<dyn Fn(&OrchestratorEvent) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub model: String,
    pub max_iterations: usize,
    pub max_tokens: u32,
    pub request_max_retries: usize,
}

impl OrchestratorConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_max_retries: DEFAULT_REQUEST_MAX_RETRIES,
        }
    }
}

pub struct Orchestrator {
    client: Arc<dyn LlmClient>,
    tools: ToolHandler,
    config: OrchestratorConfig,
    messages: Vec<Message>,
    handlers: Vec<EventHandler>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn LlmClient>, tools: ToolHandler, config: OrchestratorConfig) -> Self {
        Self {
            client,
            tools,
            config,
            messages: Vec::new(),
            handlers: Vec::new(),
        }
    }

    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn tools(&self) -> &ToolHandler {
        &self.tools
    }

    fn emit(&self, event: OrchestratorEvent) {
        for handler in &self.handlers {
            handler(&event);
        }
    }

    /// Drives the conversation until the assistant emits a final report,
    /// annotated with observed lineage, or the iteration cap is reached.
    pub async fn run(&mut self) -> Result<FinalReport, OrchestratorError> {
        let tools = tool_definitions();

        for iteration in 1..=self.config.max_iterations {
            info!(iteration, "requesting completion");
            self.emit(OrchestratorEvent::IterationStart { iteration });

            let request = ChatRequest {
                model: self.config.model.clone(),
                messages: self.messages.clone(),
                tools: tools.clone(),
                max_tokens: Some(self.config.max_tokens),
                temperature: None,
            };
            let response = self.complete_with_retry(request).await?;

            let assistant = response.message;
            let text = assistant.text_content();
            if !text.is_empty() {
                self.emit(OrchestratorEvent::AssistantText { text: text.clone() });
            }
            // The assistant turn goes into history verbatim, tool calls
            // included, before anything is executed.
            let tool_calls = assistant.tool_calls();
            self.messages.push(assistant);

            if !tool_calls.is_empty() {
                self.dispatch_tool_calls(&tool_calls).await?;
                continue;
            }

            if let Some(report) = parse_final_report(&text) {
                self.emit(OrchestratorEvent::ReportReady);
                let lineage = self.tools.lineage();
                return Ok(report
                    .with_lineage(lineage.start_branch_id(), lineage.latest_branch_id()));
            }
            info!("assistant response was not a final report; continuing");
            self.emit(OrchestratorEvent::NotFinalYet);
        }

        Err(OrchestratorError::IterationsExhausted(
            self.config.max_iterations,
        ))
    }

    async fn dispatch_tool_calls(
        &mut self,
        tool_calls: &[ToolCall],
    ) -> Result<(), OrchestratorError> {
        for call in tool_calls {
            // Argument payloads preserved as raw text are echoed without
            // re-quoting.
            let arguments = match &call.arguments {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            self.emit(OrchestratorEvent::ToolCallStart {
                name: call.name.clone(),
                arguments,
            });
            let result = self.tools.handle(call).await;
            self.emit(OrchestratorEvent::ToolCallEnd {
                name: call.name.clone(),
                result: result.clone(),
            });
            let is_error = result.is_error();
            let content = serde_json::to_string(&result)?;
            self.messages
                .push(Message::tool_result(&call.id, &call.name, content, is_error));
        }
        Ok(())
    }

    /// Independent bounded retry around the completion call. Only transport
    /// and retryable-status failures are retried; everything else aborts the
    /// run immediately.
    async fn complete_with_retry(
        &self,
        request: ChatRequest,
    ) -> Result<ChatResponse, OrchestratorError> {
        let max_retries = self.config.request_max_retries.max(1);
        let mut last_error: Option<AiError> = None;

        for attempt in 0..max_retries {
            match self.client.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    if !is_retryable_ai_error(&error) || attempt + 1 == max_retries {
                        return Err(error.into());
                    }
                    let backoff_ms = next_backoff_ms(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries,
                        backoff_ms,
                        %error,
                        "completion call failed; retrying"
                    );
                    last_error = Some(error);
                    sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| {
                AiError::InvalidResponse("completion retry loop terminated unexpectedly".to_string())
            })
            .into())
    }
}
