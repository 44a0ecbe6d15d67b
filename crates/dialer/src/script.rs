//! JSON-lines replay scripts
//!
//! Each non-blank line is one step with the offset in milliseconds from the
//! start of the replay:
//!
//! ```text
//! {"at_ms":0,"step":"initiate","phone":"+15550100","lead":"lead-1"}
//! {"at_ms":1500,"step":"visibility","state":"background"}
//! {"at_ms":3000,"step":"native","payload":{"source":"calllog","duration":45,"callLogType":2,"callLogId":981}}
//! {"at_ms":3500,"step":"disposition","disposition":"Interested","notes":"call back friday"}
//! ```
//!
//! Lines starting with `#` are comments.

use anyhow::{bail, Context, Result};
use crm_dialer_core::{AppVisibility, CallLogEntry, RawCallFinished};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptLine {
    pub at_ms: u64,
    #[serde(flatten)]
    pub step: Step,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum Step {
    Initiate { phone: String, lead: Option<String> },
    Native { payload: RawCallFinished },
    Visibility { state: AppVisibility },
    Clear,
    /// Save a disposition for the most recent completed call
    Disposition { disposition: String, notes: Option<String> },
    /// Push call-log history through a bulk sync
    Sync { entries: Vec<CallLogEntry> },
}

/// Parse a script; steps must be in non-decreasing `at_ms` order
pub fn parse(text: &str) -> Result<Vec<ScriptLine>> {
    let mut lines = Vec::new();
    let mut last_at = 0;
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed: ScriptLine =
            serde_json::from_str(line).with_context(|| format!("script line {}", number + 1))?;
        if parsed.at_ms < last_at {
            bail!("script line {}: at_ms {} goes back in time", number + 1, parsed.at_ms);
        }
        last_at = parsed.at_ms;
        lines.push(parsed);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let text = r#"
# outgoing call that connects
{"at_ms":0,"step":"initiate","phone":"+15550100","lead":"lead-1"}
{"at_ms":1500,"step":"visibility","state":"background"}
{"at_ms":3000,"step":"native","payload":{"source":"calllog","duration":45,"callLogType":2}}
{"at_ms":3500,"step":"clear"}
"#;
        let steps = parse(text).unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(
            steps[0].step,
            Step::Initiate {
                phone: "+15550100".to_string(),
                lead: Some("lead-1".to_string())
            }
        );
        assert_eq!(
            steps[1].step,
            Step::Visibility {
                state: AppVisibility::Background
            }
        );
        match &steps[2].step {
            Step::Native { payload } => assert_eq!(payload.call_log_type, Some(2)),
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(steps[3].step, Step::Clear);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let text = "{\"at_ms\":500,\"step\":\"clear\"}\n{\"at_ms\":100,\"step\":\"clear\"}";
        assert!(parse(text).is_err());
    }

    #[test]
    fn test_unknown_step_rejected() {
        assert!(parse(r#"{"at_ms":0,"step":"hangup"}"#).is_err());
    }
}
