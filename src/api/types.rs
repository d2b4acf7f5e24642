//! Wire types exchanged with the attendance backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One attendance-taking session, as returned by code validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub class_info: Option<String>,
    #[serde(default)]
    pub faculty_name: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
}

impl Session {
    /// Display title, falling back to a generic label
    pub fn title(&self) -> &str {
        self.class_name.as_deref().unwrap_or("Session")
    }
}

/// Variant options a deployment can choose: refresh interval and end confirmation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayOptions {
    /// QR refresh interval in seconds
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub confirm_end: Option<bool>,
}

/// Response of `POST /display/validate`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub session: Session,
    #[serde(default)]
    pub students_scanned: u32,
    #[serde(default)]
    pub total_enrolled: Option<u32>,
    #[serde(default)]
    pub config: Option<DisplayOptions>,
}

/// Response of `GET /display/{id}/qr-token`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrToken {
    pub qr_data: String,
    #[serde(default)]
    pub students_scanned: u32,
}

/// A student who scanned within the trailing window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentScan {
    pub student_name: String,
    #[serde(default)]
    pub roll_number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RecentScansResponse {
    #[serde(default)]
    pub recent_scans: Vec<RecentScan>,
}

/// Response of `GET /display/{id}/stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    #[serde(default)]
    pub students_scanned: u32,
    #[serde(default)]
    pub total_enrolled: Option<u32>,
    /// Counters this client does not interpret, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Response of `POST /display/{id}/end`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndResult {
    #[serde(default)]
    pub marked_present: Option<u32>,
    #[serde(default)]
    pub marked_absent: Option<u32>,
    #[serde(default)]
    pub duration_minutes: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionCodeBody<'a> {
    pub session_code: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_response_minimal() {
        let json = r#"{"session":{"id":"s1","className":"CS101"},"totalEnrolled":50}"#;
        let resp: ValidateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.session.id, "s1");
        assert_eq!(resp.session.title(), "CS101");
        assert_eq!(resp.students_scanned, 0);
        assert_eq!(resp.total_enrolled, Some(50));
        assert!(resp.config.is_none());
    }

    #[test]
    fn test_validate_response_with_options() {
        let json = r#"{
            "session": {"id":"s2","facultyName":"Dr. Rao","startTime":"2026-10-19T09:00:00Z"},
            "studentsScanned": 4,
            "config": {"interval": 5, "confirmEnd": false}
        }"#;
        let resp: ValidateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.session.title(), "Session");
        assert!(resp.session.start_time.is_some());
        let options = resp.config.unwrap();
        assert_eq!(options.interval, Some(5));
        assert_eq!(options.confirm_end, Some(false));
    }

    #[test]
    fn test_recent_scans_use_snake_case() {
        let json = r#"{"recentScans":[{"student_name":"Asha","roll_number":"21CS07"}]}"#;
        let resp: RecentScansResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.recent_scans[0].student_name, "Asha");
        assert_eq!(resp.recent_scans[0].roll_number, "21CS07");
    }

    #[test]
    fn test_stats_keep_unknown_counters() {
        let json = r#"{"studentsScanned":12,"totalEnrolled":40,"scansLastMinute":3}"#;
        let stats: SessionStats = serde_json::from_str(json).unwrap();
        assert_eq!(stats.students_scanned, 12);
        assert_eq!(stats.extra.get("scansLastMinute"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_end_result_partial() {
        let result: SessionEndResult = serde_json::from_str(r#"{"markedPresent":31}"#).unwrap();
        assert_eq!(result.marked_present, Some(31));
        assert_eq!(result.marked_absent, None);
    }
}
