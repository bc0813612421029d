use serde::{Deserialize, Serialize};

/// Unread-notification count as reported by the server.
///
/// Both the push stream and the polling endpoint use this shape
/// (`{"new": <count>}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationCount {
    pub new: u64,
}

/// One active time-tracking stopwatch.
///
/// The server reports a list; in practice zero or one entries exist per
/// user, but nothing here assumes that. Field names are camelCase on the
/// wire to match the origin server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopwatchRecord {
    pub repo_owner_name: String,
    pub repo_name: String,
    pub issue_index: u64,
    /// Elapsed seconds as of the moment the server produced this record.
    pub elapsed_seconds: u64,
}

impl StopwatchRecord {
    /// Issue reference in `owner/repo#index` form, for display and links.
    pub fn issue_ref(&self) -> String {
        format!(
            "{}/{}#{}",
            self.repo_owner_name, self.repo_name, self.issue_index
        )
    }
}

/// Payload of a `logout` push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutNotice {
    /// True when this browser instance is the one that logged out.
    /// A `false` notice is informational and must not tear anything down.
    pub here: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwatch_record_wire_field_names() {
        let record = StopwatchRecord {
            repo_owner_name: "alice".to_string(),
            repo_name: "widgets".to_string(),
            issue_index: 42,
            elapsed_seconds: 65,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""repoOwnerName":"alice""#));
        assert!(json.contains(r#""elapsedSeconds":65"#));
    }

    #[test]
    fn test_stopwatch_record_issue_ref() {
        let record = StopwatchRecord {
            repo_owner_name: "alice".to_string(),
            repo_name: "widgets".to_string(),
            issue_index: 42,
            elapsed_seconds: 0,
        };
        assert_eq!(record.issue_ref(), "alice/widgets#42");
    }

    #[test]
    fn test_notification_count_shape() {
        let count: NotificationCount = serde_json::from_str(r#"{"new": 7}"#).unwrap();
        assert_eq!(count.new, 7);
    }
}
