use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{customer::Customer, group::GroupWithMembers};

pub const DEFAULT_KIND: &str = "Custom";
pub const DEFAULT_RECURRENCE: &str = "One-time";

/// Metadata of an uploaded image or video. The bytes live in the uploads
/// directory under `filename`; `url` is the storage locator handed back to
/// clients (a relative `/uploads/...` path or an absolute public URL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMeta {
    pub filename: String,
    pub original_name: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub url: Option<String>,
}

impl FileMeta {
    pub fn display_name(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.filename)
    }

    pub fn mime_type_or_default(&self) -> &str {
        self.mime_type.as_deref().unwrap_or("application/octet-stream")
    }

    /// The locator, when it is already reachable from the public internet.
    pub fn public_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .filter(|u| u.starts_with("https://") || u.starts_with("http://"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub notes: Option<String>,
    /// Absolute fire time.
    pub date: DateTime<Utc>,
    /// Informational only: a reminder fires once regardless of this label.
    pub recurrence: String,
    pub recipients: Vec<Uuid>,
    pub groups: Vec<Uuid>,
    pub image: Option<FileMeta>,
    pub video: Option<FileMeta>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    /// Notes, when present and not blank.
    pub fn notes_text(&self) -> Option<&str> {
        self.notes.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

/// A reminder reloaded with its recipients and groups (and the groups'
/// members) resolved to full records. References that no longer exist are
/// dropped.
#[derive(Debug, Clone, Serialize)]
pub struct PopulatedReminder {
    pub reminder: Reminder,
    pub recipients: Vec<Customer>,
    pub groups: Vec<GroupWithMembers>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReminderRequest {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub notes: Option<String>,
    pub date: DateTime<Utc>,
    pub recurrence: Option<String>,
    #[serde(default)]
    pub recipients: Vec<Uuid>,
    #[serde(default)]
    pub groups: Vec<Uuid>,
    pub image: Option<FileMeta>,
    pub video: Option<FileMeta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateReminderRequest {
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub notes: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub recurrence: Option<String>,
    pub recipients: Option<Vec<Uuid>>,
    pub groups: Option<Vec<Uuid>>,
    pub image: Option<FileMeta>,
    pub video: Option<FileMeta>,
}

/// Filter for `ReminderStore::find`. Empty query matches every reminder.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReminderQuery {
    /// Only reminders firing strictly after this instant.
    pub due_after: Option<DateTime<Utc>>,
    /// Only reminders firing at or before this instant.
    pub due_before: Option<DateTime<Utc>>,
    /// Only reminders addressed directly to this customer.
    pub recipient: Option<Uuid>,
    /// Only reminders addressed to this group.
    pub group: Option<Uuid>,
}

impl ReminderQuery {
    pub fn matches(&self, reminder: &Reminder) -> bool {
        self.due_after.map_or(true, |after| reminder.date > after)
            && self.due_before.map_or(true, |before| reminder.date <= before)
            && self.recipient.map_or(true, |c| reminder.recipients.contains(&c))
            && self.group.map_or(true, |g| reminder.groups.contains(&g))
    }
}

/// Calendar feed entry.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: String,
}

impl From<&Reminder> for CalendarEvent {
    fn from(r: &Reminder) -> Self {
        Self {
            id: r.id.to_string(),
            title: r.title.clone(),
            start: r.date.to_rfc3339(),
        }
    }
}
