//! Log records as they travel through the pipeline
//!
//! The collector never looks inside a record. A record is the single-line JSON
//! text of one element of the API's response array, kept in server order.

use serde_json::Value;
use std::fmt;

/// One audit-log event, serialized as a single line of JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord(String);

impl LogRecord {
    pub fn new(line: impl Into<String>) -> Self {
        Self(line.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LogRecord {
    fn from(line: &str) -> Self {
        Self::new(line)
    }
}

/// Decode a response body holding a JSON array and compact every element onto
/// a single line. Element order and key order are preserved.
pub fn records_from_body(body: &[u8]) -> Result<Vec<LogRecord>, serde_json::Error> {
    let items: Vec<Value> = serde_json::from_slice(body)?;
    items
        .iter()
        .map(|item| serde_json::to_string(item).map(LogRecord))
        .collect()
}
