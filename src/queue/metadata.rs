//! Queue and message metadata.
//!
//! Both are stored as hashes of decimal strings. Parsing is lenient: a
//! missing or malformed numeric field reads as zero, and a missing message
//! hash reads as a message with [`Status::Unknown`].

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// Message metadata fields.
pub(crate) const STATUS: &str = "status";
pub(crate) const RETRIES: &str = "retries";
pub(crate) const RETRIED_AT: &str = "retried_at";
pub(crate) const RETRY_ERROR: &str = "retry_error";

// Queue metadata fields.
pub(crate) const PROCESSED: &str = "processed";
pub(crate) const FAILED: &str = "failed";
pub(crate) const RETRIED: &str = "retried";
pub(crate) const VERSION: &str = "version";

// Shared.
pub(crate) const CREATED_AT: &str = "created_at";
pub(crate) const UPDATED_AT: &str = "updated_at";

/// Lifecycle status of a message.
///
/// Always mirrors the container currently holding the message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Unknown,
    Pending,
    Processing,
    Scheduled,
    Dead,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Scheduled => "scheduled",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = std::convert::Infallible;

    /// Unrecognized values parse as [`Status::Unknown`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "scheduled" => Self::Scheduled,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        })
    }
}

fn int(hash: &HashMap<String, String>, field: &str) -> i64 {
    hash.get(field)
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

/// Statistics and bookkeeping for one queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueMetadata {
    /// Messages handed to a consumer.
    pub processed: i64,
    /// Consumptions that ended in a recognized failure.
    pub failed: i64,
    /// Consumptions of a message that had failed before.
    pub retried: i64,
    pub created_at: i64,
    pub updated_at: i64,
    /// Protocol version the queue was created with.
    pub version: i64,
}

impl QueueMetadata {
    pub(crate) fn parse(hash: &HashMap<String, String>) -> Self {
        Self {
            processed: int(hash, PROCESSED),
            failed: int(hash, FAILED),
            retried: int(hash, RETRIED),
            created_at: int(hash, CREATED_AT),
            updated_at: int(hash, UPDATED_AT),
            version: int(hash, VERSION),
        }
    }
}

/// Status and retry bookkeeping for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageMetadata {
    pub status: Status,
    /// Failures since the message was last created or killed.
    pub retries: i64,
    pub retried_at: Option<i64>,
    pub retry_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl MessageMetadata {
    pub(crate) fn parse(hash: &HashMap<String, String>) -> Self {
        Self {
            status: hash
                .get(STATUS)
                .map(|s| s.parse().unwrap_or_default())
                .unwrap_or_default(),
            retries: int(hash, RETRIES),
            retried_at: hash.get(RETRIED_AT).and_then(|v| v.parse().ok()),
            retry_error: hash.get(RETRY_ERROR).cloned(),
            created_at: int(hash, CREATED_AT),
            updated_at: int(hash, UPDATED_AT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_status_strings() {
        for status in [
            Status::Unknown,
            Status::Pending,
            Status::Processing,
            Status::Scheduled,
            Status::Dead,
        ] {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
        assert_eq!("bogus".parse::<Status>().unwrap(), Status::Unknown);
    }

    #[test]
    fn test_parse_message_metadata() {
        let meta = MessageMetadata::parse(&hash(&[
            ("status", "scheduled"),
            ("retries", "2"),
            ("retried_at", "1700000000"),
            ("retry_error", "boom"),
            ("created_at", "1690000000"),
            ("updated_at", "1700000000"),
        ]));

        assert_eq!(meta.status, Status::Scheduled);
        assert_eq!(meta.retries, 2);
        assert_eq!(meta.retried_at, Some(1_700_000_000));
        assert_eq!(meta.retry_error.as_deref(), Some("boom"));
        assert_eq!(meta.created_at, 1_690_000_000);
    }

    #[test]
    fn test_parse_missing_message_metadata() {
        let meta = MessageMetadata::parse(&HashMap::new());
        assert_eq!(meta, MessageMetadata::default());
        assert_eq!(meta.status, Status::Unknown);
        assert_eq!(meta.retried_at, None);
    }

    #[test]
    fn test_parse_queue_metadata_is_lenient() {
        let meta = QueueMetadata::parse(&hash(&[
            ("processed", "10"),
            ("failed", "not a number"),
            ("version", "1"),
        ]));

        assert_eq!(meta.processed, 10);
        assert_eq!(meta.failed, 0);
        assert_eq!(meta.retried, 0);
        assert_eq!(meta.version, 1);
    }
}
