use uuid::Uuid;

use crate::models::reminder::{
    CreateReminderRequest, PopulatedReminder, Reminder, ReminderQuery, UpdateReminderRequest,
};

/// Record store for reminders and the customers/groups they reference.
#[async_trait::async_trait]
pub trait ReminderStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Reminder>>;

    /// Reload a reminder with recipients, groups and group members populated.
    async fn find_populated(&self, id: Uuid) -> anyhow::Result<Option<PopulatedReminder>>;

    /// Reminders matching `query`, latest fire time first.
    async fn find(&self, query: &ReminderQuery) -> anyhow::Result<Vec<Reminder>>;

    async fn insert(&self, req: &CreateReminderRequest) -> anyhow::Result<Reminder>;

    /// Returns `None` when no reminder has this id.
    async fn update(&self, id: Uuid, req: &UpdateReminderRequest)
        -> anyhow::Result<Option<Reminder>>;

    /// Returns whether a reminder was removed.
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}
