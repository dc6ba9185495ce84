use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::store::ReminderStore,
    models::{
        customer::{Customer, DeliveryChannel},
        group::{Group, GroupWithMembers},
        reminder::{
            CreateReminderRequest, PopulatedReminder, Reminder, ReminderQuery,
            UpdateReminderRequest, DEFAULT_KIND, DEFAULT_RECURRENCE,
        },
    },
};

#[derive(Default)]
struct MemoryState {
    reminders: HashMap<Uuid, Reminder>,
    customers: HashMap<Uuid, Customer>,
    groups: HashMap<Uuid, (Group, Vec<Uuid>)>,
}

/// Process-local store used as the test double for `ReminderStore`. The
/// seeding helpers (`add_customer`, `add_group`, `remove_customer`) stand in
/// for the customer and group CRUD that lives outside this service.
#[derive(Default)]
pub struct InMemoryReminderStore {
    state: Mutex<MemoryState>,
}

impl InMemoryReminderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_customer(
        &self,
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
        channels: &[DeliveryChannel],
    ) -> Customer {
        let customer = Customer {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.map(String::from),
            phone: phone.map(String::from),
            preferred_delivery: channels.iter().map(|c| c.to_string()).collect(),
            created_at: Utc::now(),
        };
        self.state()
            .customers
            .insert(customer.id, customer.clone());
        customer
    }

    pub fn add_group(&self, name: &str, members: &[Uuid]) -> Group {
        let group = Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.state()
            .groups
            .insert(group.id, (group.clone(), members.to_vec()));
        group
    }

    pub fn remove_customer(&self, id: Uuid) {
        self.state().customers.remove(&id);
    }
}

#[async_trait::async_trait]
impl ReminderStore for InMemoryReminderStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Reminder>> {
        Ok(self.state().reminders.get(&id).cloned())
    }

    async fn find_populated(&self, id: Uuid) -> anyhow::Result<Option<PopulatedReminder>> {
        let state = self.state();
        let Some(reminder) = state.reminders.get(&id).cloned() else {
            return Ok(None);
        };

        let recipients = reminder
            .recipients
            .iter()
            .filter_map(|c| state.customers.get(c).cloned())
            .collect();

        let groups = reminder
            .groups
            .iter()
            .filter_map(|g| state.groups.get(g))
            .map(|(group, members)| GroupWithMembers {
                id: group.id,
                name: group.name.clone(),
                members: members
                    .iter()
                    .filter_map(|m| state.customers.get(m).cloned())
                    .collect(),
            })
            .collect();

        Ok(Some(PopulatedReminder {
            reminder,
            recipients,
            groups,
        }))
    }

    async fn find(&self, query: &ReminderQuery) -> anyhow::Result<Vec<Reminder>> {
        let mut reminders: Vec<Reminder> = self
            .state()
            .reminders
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        reminders.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(reminders)
    }

    async fn insert(&self, req: &CreateReminderRequest) -> anyhow::Result<Reminder> {
        let now = Utc::now();
        let reminder = Reminder {
            id: Uuid::new_v4(),
            title: req.title.clone(),
            kind: req.kind.clone().unwrap_or_else(|| DEFAULT_KIND.into()),
            notes: req.notes.clone(),
            date: req.date,
            recurrence: req
                .recurrence
                .clone()
                .unwrap_or_else(|| DEFAULT_RECURRENCE.into()),
            recipients: req.recipients.clone(),
            groups: req.groups.clone(),
            image: req.image.clone(),
            video: req.video.clone(),
            created_at: now,
            updated_at: now,
        };
        self.state()
            .reminders
            .insert(reminder.id, reminder.clone());
        Ok(reminder)
    }

    async fn update(
        &self,
        id: Uuid,
        req: &UpdateReminderRequest,
    ) -> anyhow::Result<Option<Reminder>> {
        let mut state = self.state();
        let Some(reminder) = state.reminders.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(title) = &req.title {
            reminder.title = title.clone();
        }
        if let Some(kind) = &req.kind {
            reminder.kind = kind.clone();
        }
        if let Some(notes) = &req.notes {
            reminder.notes = Some(notes.clone());
        }
        if let Some(date) = req.date {
            reminder.date = date;
        }
        if let Some(recurrence) = &req.recurrence {
            reminder.recurrence = recurrence.clone();
        }
        if let Some(recipients) = &req.recipients {
            reminder.recipients = recipients.clone();
        }
        if let Some(groups) = &req.groups {
            reminder.groups = groups.clone();
        }
        if let Some(image) = &req.image {
            reminder.image = Some(image.clone());
        }
        if let Some(video) = &req.video {
            reminder.video = Some(video.clone());
        }
        reminder.updated_at = Utc::now();

        Ok(Some(reminder.clone()))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.state().reminders.remove(&id).is_some())
    }
}
