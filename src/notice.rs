//! Purpose: Define a stable, structured schema for non-fatal stderr notices.
//! Exports: `Notice`, `notice_json`, `notice_time_now`.
//! Role: Carries warnings such as a refused partition re-read out of the shell.
//! Invariants: Notices are non-fatal and never alter the command's outcome.
//! Invariants: JSON schema is stable once published; fields are additive-only.
use serde_json::{Map, Value, json};
use time::format_description::well_known::Rfc3339;

use crate::core::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: String,
    pub time: String,
    pub cmd: String,
    pub disk: Option<u32>,
    pub message: String,
    pub details: Map<String, Value>,
}

impl Notice {
    /// Wraps a best-effort failure reported by command `cmd`.
    pub fn from_warning(cmd: &str, err: &Error) -> Self {
        let mut details = Map::new();
        details.insert("error_kind".to_string(), json!(format!("{:?}", err.kind())));
        if let Some(path) = err.path() {
            details.insert("path".to_string(), json!(path.display().to_string()));
        }
        if let Some(hint) = err.hint() {
            details.insert("hint".to_string(), json!(hint));
        }
        Self {
            kind: "warning".to_string(),
            time: notice_time_now().unwrap_or_default(),
            cmd: cmd.to_string(),
            disk: err.disk(),
            message: err.message().unwrap_or("operation partially failed").to_string(),
            details,
        }
    }
}

pub fn notice_time_now() -> Option<String> {
    time::OffsetDateTime::now_utc().format(&Rfc3339).ok()
}

pub fn notice_json(notice: &Notice) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(notice.kind));
    inner.insert("time".to_string(), json!(notice.time));
    inner.insert("cmd".to_string(), json!(notice.cmd));
    if let Some(disk) = notice.disk {
        inner.insert("disk".to_string(), json!(disk));
    }
    inner.insert("message".to_string(), json!(notice.message));
    inner.insert("details".to_string(), Value::Object(notice.details.clone()));

    let mut outer = Map::new();
    outer.insert("notice".to_string(), Value::Object(inner));
    Value::Object(outer)
}
