//! Tool dispatch and the bounded conversation loop that drive a multi-phase
//! code-change workflow against the branch-execution service.
//!
//! The controller LLM requests `execute_agent`, `check_status`, and
//! `read_artifact` calls; [`ToolHandler`] validates and executes them,
//! [`poller`] waits for branch runs to reach a terminal state, and
//! [`Orchestrator`] replays the growing turn history until the controller
//! produces a [`FinalReport`].

mod error;
mod lineage;
mod orchestrator;
pub mod poller;
pub mod prompts;
mod report;
mod tools;

pub use error::{OrchestratorError, ToolError};
pub use lineage::LineageTracker;
pub use orchestrator::{
    EventHandler, Orchestrator, OrchestratorConfig, OrchestratorEvent, DEFAULT_MAX_ITERATIONS,
};
pub use poller::PollConfig;
pub use report::{parse_final_report, FinalReport, ReportType};
pub use tools::{
    tool_definitions, ToolHandler, ToolResult, DEFAULT_MAX_BRANCHES, TOOL_CHECK_STATUS,
    TOOL_EXECUTE_AGENT, TOOL_READ_ARTIFACT,
};
