//! Reference `SAFE_REPORT` runner.
//!
//! Produces two content-stable artifacts from the intent's `subject` and
//! `data`: a canonical-JSON report and a fixed-template Markdown rendering
//! of the same fields. Neither contains a timestamp; identical inputs yield
//! identical bytes on any host.

use serde_json::{Map, Value};

use super::{JobRunner, ProducedArtifact, RunContext, RunnerError};
use crate::canonical::to_canonical_bytes;
use crate::intent::{JobInputs, NormalizedIntent};
use crate::store::SafeRelPath;

/// Version stamped into `generatedBy.reportVersion`.
pub const REPORT_VERSION: &str = "0.1.0";

/// How many keys the summary lists before truncating.
const SUMMARY_KEY_LIMIT: usize = 5;

/// The reference report runner.
pub struct SafeReportRunner;

impl JobRunner for SafeReportRunner {
    fn job_type(&self) -> &'static str {
        "SAFE_REPORT"
    }

    fn run(
        &self,
        intent: &NormalizedIntent,
        ctx: &RunContext,
    ) -> Result<Vec<ProducedArtifact>, RunnerError> {
        let JobInputs::SafeReport(inputs) = &intent.inputs else {
            return Err(RunnerError::msg("inputs do not match jobType SAFE_REPORT"));
        };

        let summary = summarize(&inputs.data);
        let canonical_data = to_canonical_bytes(&Value::Object(inputs.data.clone()))
            .map_err(|e| RunnerError::msg(format!("data is not canonically encodable: {e}")))?;

        let report = serde_json::json!({
            "subject": inputs.subject,
            "data": inputs.data,
            "summary": summary,
            "stats": {
                "keysCount": inputs.data.len(),
                "approxBytes": canonical_data.len(),
            },
            "generatedBy": {
                "jobType": ctx.job_type,
                "intentId": ctx.intent_id,
                "runId": ctx.run_id,
                "reportVersion": REPORT_VERSION,
            },
        });
        let report_bytes = to_canonical_bytes(&report)
            .map_err(|e| RunnerError::msg(format!("report is not canonically encodable: {e}")))?;

        let markdown = render_markdown(
            &inputs.subject,
            &summary,
            &inputs.data,
            canonical_data.len(),
            ctx,
        )
        .map_err(|e| RunnerError::msg(format!("data is not canonically encodable: {e}")))?;

        Ok(vec![
            ProducedArtifact {
                path: report_json_path(),
                bytes: report_bytes,
            },
            ProducedArtifact {
                path: report_md_path(),
                bytes: markdown.into_bytes(),
            },
        ])
    }
}

fn report_json_path() -> SafeRelPath {
    SafeRelPath::new("artifacts/report.json").expect("literal path is safe")
}

fn report_md_path() -> SafeRelPath {
    SafeRelPath::new("artifacts/report.md").expect("literal path is safe")
}

/// Builds the summary sentence from the data keys, sorted lexicographically.
fn summarize(data: &Map<String, Value>) -> String {
    let mut keys: Vec<&str> = data.keys().map(String::as_str).collect();
    keys.sort_unstable();

    match keys.len() {
        0 => "Empty data object - no keys to report.".to_string(),
        n if n <= SUMMARY_KEY_LIMIT => {
            format!("Report contains {n} key(s): {}.", keys.join(", "))
        },
        n => format!(
            "Report contains {n} key(s). First {SUMMARY_KEY_LIMIT}: {}.",
            keys[..SUMMARY_KEY_LIMIT].join(", ")
        ),
    }
}

/// Renders the fixed Markdown template. Data items are emitted in sorted
/// key order with canonical-JSON values.
fn render_markdown(
    subject: &str,
    summary: &str,
    data: &Map<String, Value>,
    approx_bytes: usize,
    ctx: &RunContext,
) -> Result<String, crate::canonical::EncodingError> {
    let mut out = String::new();
    out.push_str("# Safe Report\n\n");
    out.push_str("## Subject\n\n");
    out.push_str(subject);
    out.push_str("\n\n## Summary\n\n");
    out.push_str(summary);
    out.push_str("\n\n## Data\n\n");

    if data.is_empty() {
        out.push_str("(no data)\n");
    } else {
        let mut keys: Vec<&String> = data.keys().collect();
        keys.sort();
        for key in keys {
            let rendered = crate::canonical::to_canonical_string(&data[key.as_str()])?;
            out.push_str("- **");
            out.push_str(key);
            out.push_str("**: ");
            out.push_str(&rendered);
            out.push('\n');
        }
    }

    out.push_str("\n## Stats\n\n");
    out.push_str(&format!("- keys: {}\n", data.len()));
    out.push_str(&format!("- approximate size: {approx_bytes} bytes\n"));

    out.push_str("\n## Provenance\n\n");
    out.push_str(&format!("- jobType: {}\n", ctx.job_type));
    out.push_str(&format!("- intentId: `{}`\n", ctx.intent_id));
    out.push_str(&format!("- runId: `{}`\n", ctx.run_id));
    out.push_str(&format!("- reportVersion: {REPORT_VERSION}\n"));

    Ok(out)
}
