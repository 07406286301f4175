use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status text used for the synthetic offline response.
pub const NETWORK_ERROR_STATUS_TEXT: &str = "Network error";

/// Body of the synthetic offline response.
pub const NETWORK_ERROR_BODY: &str = "Network error occurred";

/// A response as stored in a container: status, headers and raw bytes, verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(
        status: u16,
        status_text: impl Into<String>,
        headers: Vec<(String, String)>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers,
            body: body.into(),
            cached_at: Utc::now(),
        }
    }

    /// The 408 returned when the network fails and the live cache has no entry.
    /// Carries no cache headers.
    pub fn network_error() -> Self {
        Self::new(
            408,
            NETWORK_ERROR_STATUS_TEXT,
            vec![("content-type".to_string(), "text/plain".to_string())],
            Bytes::from_static(NETWORK_ERROR_BODY.as_bytes()),
        )
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup, first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Clock skew lands here too
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub(crate) fn meta(&self, key: &str) -> EntryMeta {
        EntryMeta {
            key: key.to_string(),
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            cached_at: self.cached_at,
            size: self.body.len() as u64,
        }
    }

    pub(crate) fn from_parts(meta: EntryMeta, body: Bytes) -> Self {
        Self {
            status: meta.status,
            status_text: meta.status_text,
            headers: meta.headers,
            body,
            cached_at: meta.cached_at,
        }
    }
}

/// On-disk description of an entry; the body lives in a sibling file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EntryMeta {
    pub key: String,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub cached_at: DateTime<Utc>,
    pub size: u64,
}
