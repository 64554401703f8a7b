use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
#[cfg(feature = "ts")]
use ts_rs::TS;

use super::Priority;

/// Longest description the report form accepts.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    Equipment,
    SampleIntegrity,
    Temperature,
    Access,
    Safety,
    Other,
}

impl IssueKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equipment" => Some(IssueKind::Equipment),
            "sample-integrity" | "sample" => Some(IssueKind::SampleIntegrity),
            "temperature" => Some(IssueKind::Temperature),
            "access" => Some(IssueKind::Access),
            "safety" => Some(IssueKind::Safety),
            "other" => Some(IssueKind::Other),
            _ => None,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReportError {
    #[error("Issue type is required")]
    MissingKind,

    #[error("Description is required")]
    EmptyDescription,

    #[error("Description is {0} characters, limit is 500")]
    DescriptionTooLong(usize),
}

/// The report form as typed so far. Persisted as the single report draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct ReportDraft {
    #[serde(rename = "issueType", default)]
    pub kind: Option<IssueKind>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
}

impl ReportDraft {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.location.is_empty() && self.description.is_empty()
    }

    /// Label shown next to the priority selector.
    pub fn priority_label(&self) -> &'static str {
        match self.priority {
            Priority::Low => "Low Priority Report",
            Priority::Medium => "Standard Report",
            Priority::High => "High Priority Report",
            Priority::Urgent => "Urgent Report",
        }
    }

    /// Validate the form and stamp it into a report.
    pub fn finalize(&self, now: DateTime<Utc>) -> Result<IncidentReport, ReportError> {
        let kind = self.kind.ok_or(ReportError::MissingKind)?;
        let description = self.description.trim();
        if description.is_empty() {
            return Err(ReportError::EmptyDescription);
        }
        let length = description.chars().count();
        if length > MAX_DESCRIPTION_LENGTH {
            return Err(ReportError::DescriptionTooLong(length));
        }

        Ok(IncidentReport {
            id: format!("ISSUE_{}", now.timestamp_millis()),
            kind,
            priority: self.priority,
            location: self.location.trim().to_string(),
            description: description.to_string(),
            timestamp: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct IncidentReport {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub priority: Priority,
    pub location: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft() -> ReportDraft {
        ReportDraft {
            kind: Some(IssueKind::Temperature),
            priority: Priority::High,
            location: " Dock 4 ".to_string(),
            description: "Cooler read 11C on arrival".to_string(),
        }
    }

    #[test]
    fn test_finalize_stamps_id_from_millis() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
        let report = draft().finalize(now).unwrap();
        assert_eq!(report.id, format!("ISSUE_{}", now.timestamp_millis()));
        assert_eq!(report.location, "Dock 4");
        assert_eq!(report.priority, Priority::High);
    }

    #[test]
    fn test_finalize_rejects_missing_fields() {
        let now = Utc::now();
        let mut d = draft();
        d.kind = None;
        assert_eq!(d.finalize(now), Err(ReportError::MissingKind));

        let mut d = draft();
        d.description = "   ".to_string();
        assert_eq!(d.finalize(now), Err(ReportError::EmptyDescription));
    }

    #[test]
    fn test_finalize_rejects_long_description() {
        let mut d = draft();
        d.description = "x".repeat(MAX_DESCRIPTION_LENGTH + 1);
        assert_eq!(
            d.finalize(Utc::now()),
            Err(ReportError::DescriptionTooLong(MAX_DESCRIPTION_LENGTH + 1))
        );
    }

    #[test]
    fn test_priority_label() {
        let mut d = ReportDraft::default();
        assert_eq!(d.priority_label(), "Standard Report");
        d.priority = Priority::Urgent;
        assert_eq!(d.priority_label(), "Urgent Report");
    }
}
