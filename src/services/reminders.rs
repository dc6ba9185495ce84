use tracing::info;
use uuid::Uuid;

use crate::{
    db::ReminderStore,
    models::reminder::{CreateReminderRequest, Reminder, UpdateReminderRequest},
    services::scheduler::{Registration, ReminderScheduler},
};

/// Reminder writes paired with their scheduler hooks.
pub struct ReminderService;

impl ReminderService {
    /// Store a new reminder and schedule it.
    pub async fn create(
        store: &dyn ReminderStore,
        scheduler: &ReminderScheduler,
        req: &CreateReminderRequest,
    ) -> anyhow::Result<(Reminder, Registration)> {
        let reminder = store.insert(req).await?;
        info!("Reminder {} created", reminder.id);
        let registration = scheduler.register(&reminder);
        Ok((reminder, registration))
    }

    /// Apply a partial update and reschedule. `None` when the id is unknown.
    pub async fn update(
        store: &dyn ReminderStore,
        scheduler: &ReminderScheduler,
        id: Uuid,
        req: &UpdateReminderRequest,
    ) -> anyhow::Result<Option<(Reminder, Registration)>> {
        let Some(reminder) = store.update(id, req).await? else {
            return Ok(None);
        };
        let registration = scheduler.register(&reminder);
        Ok(Some((reminder, registration)))
    }

    /// Remove a reminder and its pending timer. Returns whether it existed.
    pub async fn delete(
        store: &dyn ReminderStore,
        scheduler: &ReminderScheduler,
        id: Uuid,
    ) -> anyhow::Result<bool> {
        if !store.delete(id).await? {
            return Ok(false);
        }
        scheduler.cancel(id);
        info!("Reminder {} deleted", id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use chrono_tz::Asia::Kolkata;

    use super::*;
    use crate::{
        db::InMemoryReminderStore,
        models::customer::DeliveryChannel,
        services::{
            channels::{fakes::RecordingSender, ChannelSenders, EmailSender},
            clock::FixedClock,
            dispatch::Dispatcher,
        },
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 4, 30, 0).unwrap()
    }

    fn setup() -> (Arc<InMemoryReminderStore>, Arc<RecordingSender>, ReminderScheduler) {
        let store = Arc::new(InMemoryReminderStore::new());
        let sender = Arc::new(RecordingSender::new("+919999999999"));
        let scheduler = ReminderScheduler::new(
            store.clone(),
            Arc::new(Dispatcher::new(ChannelSenders {
                email: Some(sender.clone() as Arc<dyn EmailSender>),
                ..Default::default()
            })),
            Arc::new(FixedClock(now())),
            Kolkata,
        );
        (store, sender, scheduler)
    }

    fn request(recipient: Uuid, date: DateTime<Utc>) -> CreateReminderRequest {
        CreateReminderRequest {
            title: "Renew subscription".into(),
            kind: None,
            notes: None,
            date,
            recurrence: None,
            recipients: vec![recipient],
            groups: vec![],
            image: None,
            video: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_schedules_the_reminder() {
        let (store, sender, scheduler) = setup();
        let a = store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);

        let (reminder, registration) = ReminderService::create(
            &*store,
            &scheduler,
            &request(a.id, now() + ChronoDuration::minutes(10)),
        )
        .await
        .unwrap();

        assert!(matches!(registration, Registration::Scheduled { .. }));
        assert!(scheduler.is_scheduled(reminder.id));

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert_eq!(sender.attempts(), 1);
        assert_eq!(sender.sent()[0].body, "No notes");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_in_the_past_is_stored_but_not_scheduled() {
        let (store, sender, scheduler) = setup();
        let a = store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);

        let (reminder, registration) = ReminderService::create(
            &*store,
            &scheduler,
            &request(a.id, now() - ChronoDuration::hours(1)),
        )
        .await
        .unwrap();

        assert_eq!(registration, Registration::Stale);
        assert!(store.find_by_id(reminder.id).await.unwrap().is_some());
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        assert_eq!(sender.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_into_the_past_drops_the_timer() {
        let (store, sender, scheduler) = setup();
        let a = store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);
        let (reminder, _) = ReminderService::create(
            &*store,
            &scheduler,
            &request(a.id, now() + ChronoDuration::minutes(10)),
        )
        .await
        .unwrap();

        let (_, registration) = ReminderService::update(
            &*store,
            &scheduler,
            reminder.id,
            &UpdateReminderRequest {
                date: Some(now() - ChronoDuration::minutes(5)),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(registration, Registration::Stale);
        assert!(scheduler.pending().is_empty());
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(sender.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_moves_the_fire_time() {
        let (store, sender, scheduler) = setup();
        let a = store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);
        let (reminder, _) = ReminderService::create(
            &*store,
            &scheduler,
            &request(a.id, now() + ChronoDuration::minutes(10)),
        )
        .await
        .unwrap();

        ReminderService::update(
            &*store,
            &scheduler,
            reminder.id,
            &UpdateReminderRequest {
                date: Some(now() + ChronoDuration::minutes(20)),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

        tokio::time::sleep(Duration::from_secs(15 * 60)).await;
        assert_eq!(sender.attempts(), 0);
        tokio::time::sleep(Duration::from_secs(6 * 60)).await;
        assert_eq!(sender.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_unknown_reminder() {
        let (store, _, scheduler) = setup();
        let result = ReminderService::update(
            &*store,
            &scheduler,
            Uuid::new_v4(),
            &UpdateReminderRequest::default(),
        )
        .await
        .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_cancels_the_timer() {
        let (store, sender, scheduler) = setup();
        let a = store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);
        let (reminder, _) = ReminderService::create(
            &*store,
            &scheduler,
            &request(a.id, now() + ChronoDuration::minutes(10)),
        )
        .await
        .unwrap();

        assert!(ReminderService::delete(&*store, &scheduler, reminder.id).await.unwrap());
        assert!(!scheduler.is_scheduled(reminder.id));
        assert!(!ReminderService::delete(&*store, &scheduler, reminder.id).await.unwrap());

        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(sender.attempts(), 0);
    }
}
