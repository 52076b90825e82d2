//! Test utilities and mock implementations for testing the collector


use crate::client::LogPage;
use crate::record::LogRecord;

/// Helper functions for creating test data
pub struct TestUtils;

impl TestUtils {
    /// A record whose JSON body is `{"uuid":"<id>"}`
    pub fn create_record(id: &str) -> LogRecord {
        LogRecord::new(serde_json::json!({ "uuid": id }).to_string())
    }

    pub fn create_records(ids: &[&str]) -> Vec<LogRecord> {
        ids.iter().map(|id| Self::create_record(id)).collect()
    }

    pub fn create_page(ids: &[&str], next_cursor: Option<&str>) -> LogPage {
        LogPage {
            records: Self::create_records(ids),
            next_cursor: next_cursor.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_page() {
        let page = TestUtils::create_page(&["a", "b"], Some("next"));
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].as_str(), r#"{"uuid":"a"}"#);
        assert_eq!(page.next_cursor.as_deref(), Some("next"));
    }
}
