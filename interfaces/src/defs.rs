use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mailbox (or any other live source) alerts are pulled from.
#[derive(Debug, Clone)]
pub struct LiveSourceSpec {
    pub uri: String,
}

/// An article extracted from an alert email that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub email_message_id: String,
    pub title: String,
    pub url: String,
    pub source: Option<String>,
    pub publish_time: Option<String>,
    pub summary: Option<String>,
    pub alert_subject: Option<String>,
    pub alert_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationState {
    Unclassified,
    Accepted,
    Rejected,
}

/// Everything the classifier decided about one article.
///
/// A stored article carries either all of these fields or none of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationPayload {
    pub is_selected: bool,
    pub quality_score: f64,
    pub relevance_score: f64,
    pub reason: String,
    pub key_points: Vec<String>,
    pub category: String,
}

/// Decoded outcome for one position of a classification batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationResult {
    Present(ClassificationPayload),
    Absent,
}

impl ClassificationResult {
    pub fn is_present(&self) -> bool {
        matches!(self, ClassificationResult::Present(_))
    }

    pub fn payload(&self) -> Option<&ClassificationPayload> {
        match self {
            ClassificationResult::Present(payload) => Some(payload),
            ClassificationResult::Absent => None,
        }
    }
}

/// A stored article, awaiting or having received a classification decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleCandidate {
    pub id: i64,
    pub email_message_id: String,
    pub title: String,
    pub url: String,
    pub source: Option<String>,
    pub publish_time: Option<String>,
    pub summary: Option<String>,
    pub alert_subject: Option<String>,
    pub alert_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub classification: Option<ClassificationPayload>,
    pub filtered_at: Option<DateTime<Utc>>,
}

impl ArticleCandidate {
    pub fn state(&self) -> ClassificationState {
        match &self.classification {
            None => ClassificationState::Unclassified,
            Some(payload) if payload.is_selected => ClassificationState::Accepted,
            Some(_) => ClassificationState::Rejected,
        }
    }
}
