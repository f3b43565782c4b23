use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tag enum with a single variant so the `type` field can only ever
/// serialize as `"final_report"` and anything else fails to parse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReportType {
    #[serde(rename = "final_report")]
    FinalReport,
}

/// The terminating assistant payload. Only the `type` tag is mandatory;
/// `task` is backfilled from the run's task description when the assistant
/// omits it. Unknown keys are preserved through `extra` so the printed
/// report carries everything the controller said.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalReport {
    #[serde(rename = "type")]
    pub report_type: ReportType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_branch_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_branch_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FinalReport {
    /// Annotates the report with the lineage observed during the run. The
    /// tracker is the authority: observed identifiers replace whatever the
    /// assistant wrote into these fields.
    pub fn with_lineage(mut self, start: Option<&str>, latest: Option<&str>) -> Self {
        if let Some(start) = start {
            self.start_branch_id = Some(start.to_string());
        }
        if let Some(latest) = latest {
            self.latest_branch_id = Some(latest.to_string());
        }
        self
    }

    /// Fills in `task` from the run's task description when the assistant
    /// left it out.
    pub fn with_default_task(mut self, task: &str) -> Self {
        if self.task.is_none() {
            self.task = Some(task.to_string());
        }
        self
    }
}

/// Attempts to read assistant text as the final report. Non-JSON text,
/// JSON that is not an object, and objects without `type == "final_report"`
/// all yield `None`; those turns simply continue the conversation.
pub fn parse_final_report(content: &str) -> Option<FinalReport> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_final_report;

    #[test]
    fn well_formed_report_parses() {
        let report = parse_final_report(
            r#"{"type": "final_report", "task": "add caching", "summary": "done"}"#,
        )
        .expect("should parse");
        assert_eq!(report.task.as_deref(), Some("add caching"));
        assert_eq!(report.summary.as_deref(), Some("done"));
        assert_eq!(report.start_branch_id, None);
    }

    #[test]
    fn type_tag_alone_is_a_report() {
        let report = parse_final_report(r#"{"type": "final_report"}"#).expect("should parse");
        assert_eq!(report.task, None);
        assert_eq!(report.summary, None);

        let report = report.with_default_task("add caching");
        assert_eq!(report.task.as_deref(), Some("add caching"));

        // An assistant-supplied task is not overwritten.
        let report = parse_final_report(r#"{"type": "final_report", "task": "original"}"#)
            .expect("should parse")
            .with_default_task("add caching");
        assert_eq!(report.task.as_deref(), Some("original"));
    }

    #[test]
    fn extra_fields_are_preserved() {
        let report = parse_final_report(
            r#"{"type": "final_report", "task": "t", "summary": "s", "iterations": 7}"#,
        )
        .expect("should parse");
        assert_eq!(report.extra["iterations"], json!(7));

        let round_trip = serde_json::to_value(&report).expect("serialize");
        assert_eq!(round_trip["iterations"], json!(7));
        assert_eq!(round_trip["type"], "final_report");
    }

    #[test]
    fn prose_and_wrong_type_are_not_reports() {
        assert!(parse_final_report("Working on it, one moment.").is_none());
        assert!(parse_final_report("").is_none());
        assert!(parse_final_report("[1, 2, 3]").is_none());
        assert!(
            parse_final_report(r#"{"type": "progress", "task": "t", "summary": "s"}"#).is_none()
        );
    }

    #[test]
    fn observed_lineage_replaces_assistant_supplied_values() {
        let report = parse_final_report(
            r#"{"type": "final_report", "task": "t", "summary": "s", "start_branch_id": "B0"}"#,
        )
        .expect("should parse")
        .with_lineage(Some("B9"), Some("B3"));

        assert_eq!(report.start_branch_id.as_deref(), Some("B9"));
        assert_eq!(report.latest_branch_id.as_deref(), Some("B3"));

        // Nothing observed leaves the assistant's values alone.
        let report = parse_final_report(
            r#"{"type": "final_report", "task": "t", "latest_branch_id": "B2"}"#,
        )
        .expect("should parse")
        .with_lineage(None, None);
        assert_eq!(report.latest_branch_id.as_deref(), Some("B2"));
    }
}
