use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    db::ReminderStore,
    models::reminder::{PopulatedReminder, Reminder},
    services::{
        clock::Clock,
        dispatch::{DeliveryError, Dispatcher, FireSummary},
        metrics::{FIRE_EVENTS_COUNTER, PENDING_TIMERS_GAUGE},
        recipients::{self, Delivery},
        trigger::{self, CronTrigger},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Scheduled {
        fire_at: DateTime<Utc>,
        trigger: CronTrigger,
    },
    /// The fire time had already passed; nothing was scheduled.
    Stale,
}

struct ScheduleEntry {
    trigger: CronTrigger,
    fire_at: DateTime<Utc>,
    generation: u64,
    handle: AbortHandle,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingReminder {
    pub reminder_id: Uuid,
    pub fire_at: DateTime<Utc>,
    pub trigger: String,
}

/// Owns one pending timer per reminder id and runs the notification
/// sequence when a timer goes off.
///
/// Timers live in this process only: anything pending is lost on restart.
/// Registering an id that already has a timer replaces that timer. A fire
/// event that has started is never cancelled.
#[derive(Clone)]
pub struct ReminderScheduler {
    store: Arc<dyn ReminderStore>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    entries: Arc<Mutex<HashMap<Uuid, ScheduleEntry>>>,
    generation: Arc<AtomicU64>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            timezone,
            entries: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, ScheduleEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Schedule (or reschedule) a reminder for its fire time.
    /// Must be called from within a tokio runtime.
    ///
    /// The latest registration wins: a stale fire time also drops any timer
    /// armed by an earlier registration of the same id.
    pub fn register(&self, reminder: &Reminder) -> Registration {
        let now = self.clock.now();
        if reminder.date <= now {
            debug!(
                "Reminder {} is already due ({}), not scheduling",
                reminder.id, reminder.date
            );
            if self.cancel(reminder.id) {
                info!(
                    "Reminder {} moved into the past, pending timer dropped",
                    reminder.id
                );
            }
            return Registration::Stale;
        }

        let trigger = CronTrigger::from_instant(reminder.date, self.timezone);
        let fire_at = trigger::fire_instant(reminder.date, self.timezone);
        // The fire minute may already have started; then fire right away.
        let delay = (fire_at - now).to_std().unwrap_or(Duration::ZERO);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let id = reminder.id;

        let mut entries = self.entries();
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if scheduler.claim(id, generation) {
                scheduler.fire(id).await;
            }
        });

        let entry = ScheduleEntry {
            trigger,
            fire_at,
            generation,
            handle: handle.abort_handle(),
        };
        if let Some(previous) = entries.insert(id, entry) {
            previous.handle.abort();
            info!(
                "Reminder {} rescheduled, dropped trigger '{}'",
                id, previous.trigger
            );
        }
        PENDING_TIMERS_GAUGE.set(entries.len() as f64);

        info!(
            "Reminder {} scheduled: '{}' ({}) fires at {}",
            id, trigger, self.timezone, fire_at
        );
        Registration::Scheduled { fire_at, trigger }
    }

    /// Drop the pending timer for a reminder. Returns whether one existed.
    pub fn cancel(&self, id: Uuid) -> bool {
        let mut entries = self.entries();
        let removed = entries.remove(&id);
        PENDING_TIMERS_GAUGE.set(entries.len() as f64);
        match removed {
            Some(entry) => {
                entry.handle.abort();
                info!("Reminder {} unscheduled", id);
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, id: Uuid) -> bool {
        self.entries().contains_key(&id)
    }

    /// Pending reminders, soonest first.
    pub fn pending(&self) -> Vec<PendingReminder> {
        let mut pending: Vec<PendingReminder> = self
            .entries()
            .iter()
            .map(|(id, entry)| PendingReminder {
                reminder_id: *id,
                fire_at: entry.fire_at,
                trigger: entry.trigger.to_string(),
            })
            .collect();
        pending.sort_by_key(|p| p.fire_at);
        pending
    }

    /// Abort every pending timer. Called on process stop.
    pub fn shutdown(&self) {
        let mut entries = self.entries();
        let count = entries.len();
        for (_, entry) in entries.drain() {
            entry.handle.abort();
        }
        PENDING_TIMERS_GAUGE.set(0.0);
        info!("Scheduler stopped, {} pending reminder(s) dropped", count);
    }

    /// Take ownership of the timer that just went off. False if it was
    /// replaced or cancelled in the meantime.
    fn claim(&self, id: Uuid, generation: u64) -> bool {
        let mut entries = self.entries();
        if entries.get(&id).map(|e| e.generation) != Some(generation) {
            return false;
        }
        entries.remove(&id);
        PENDING_TIMERS_GAUGE.set(entries.len() as f64);
        true
    }

    async fn fire(&self, id: Uuid) {
        info!("Triggering reminder {}", id);
        match self.run(id).await {
            Ok(Some(summary)) => {
                FIRE_EVENTS_COUNTER.with_label_values(&["dispatched"]).inc();
                info!(
                    "Reminder {} done: {} sent, {} skipped, {} failed",
                    id, summary.sent, summary.skipped, summary.failed
                );
            }
            Ok(None) => {
                FIRE_EVENTS_COUNTER.with_label_values(&["missing"]).inc();
                info!("Reminder {} no longer exists, nothing to send", id);
            }
            Err(e) => {
                FIRE_EVENTS_COUNTER.with_label_values(&["failed"]).inc();
                error!("Reminder {} failed: {:#}", id, e);
            }
        }
    }

    /// Reload, resolve and dispatch. `None` when the reminder is gone.
    async fn run(&self, id: Uuid) -> anyhow::Result<Option<FireSummary>> {
        let Some(populated) = self.store.find_populated(id).await? else {
            return Ok(None);
        };
        let deliveries = recipients::resolve(&populated);
        Ok(Some(self.dispatch_all(&populated, &deliveries).await))
    }

    /// Deliveries go out one at a time, each awaited before the next.
    async fn dispatch_all(
        &self,
        populated: &PopulatedReminder,
        deliveries: &[Delivery],
    ) -> FireSummary {
        let mut summary = FireSummary::default();
        for delivery in deliveries {
            let outcome = self.dispatcher.dispatch(delivery, &populated.reminder).await;
            summary.record(outcome);
        }
        summary
    }

    /// Send a reminder immediately, outside of its timer. Any pending timer
    /// for it is left in place.
    pub async fn deliver_now(&self, id: Uuid) -> Result<FireSummary, DeliveryError> {
        let populated = self
            .store
            .find_populated(id)
            .await?
            .ok_or(DeliveryError::NotFound(id))?;

        let deliveries = recipients::resolve(&populated);
        if deliveries.is_empty() {
            return Err(DeliveryError::NoRecipients(id));
        }

        info!("Sending reminder {} now to {} delivery(ies)", id, deliveries.len());
        Ok(self.dispatch_all(&populated, &deliveries).await)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, TimeZone};
    use chrono_tz::Asia::Kolkata;

    use super::*;
    use crate::{
        db::InMemoryReminderStore,
        models::{
            customer::DeliveryChannel,
            reminder::{CreateReminderRequest, ReminderQuery, UpdateReminderRequest},
        },
        services::{
            channels::{fakes::RecordingSender, ChannelSenders, EmailSender, SmsSender, WhatsAppSender},
            clock::FixedClock,
        },
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 4, 30, 0).unwrap()
    }

    struct Harness {
        store: Arc<InMemoryReminderStore>,
        sender: Arc<RecordingSender>,
        scheduler: ReminderScheduler,
    }

    fn harness(sender: RecordingSender) -> Harness {
        let store = Arc::new(InMemoryReminderStore::new());
        let sender = Arc::new(sender);
        let dispatcher = Dispatcher::new(ChannelSenders {
            email: Some(sender.clone() as Arc<dyn EmailSender>),
            sms: Some(sender.clone() as Arc<dyn SmsSender>),
            whatsapp: Some(sender.clone() as Arc<dyn WhatsAppSender>),
        });
        let scheduler = ReminderScheduler::new(
            store.clone(),
            Arc::new(dispatcher),
            Arc::new(FixedClock(now())),
            Kolkata,
        );
        Harness {
            store,
            sender,
            scheduler,
        }
    }

    async fn create(
        store: &InMemoryReminderStore,
        title: &str,
        date: DateTime<Utc>,
        recipients: Vec<Uuid>,
    ) -> Reminder {
        store
            .insert(&CreateReminderRequest {
                title: title.into(),
                kind: Some("Payment Due".into()),
                notes: Some("Due tomorrow".into()),
                date,
                recurrence: None,
                recipients,
                groups: vec![],
                image: None,
                video: None,
            })
            .await
            .unwrap()
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_or_current_fire_time_is_never_scheduled() {
        let h = harness(RecordingSender::new("+919999999999"));
        let a = h.store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);
        let past = create(&h.store, "Past", now() - ChronoDuration::minutes(1), vec![a.id]).await;
        let exact = create(&h.store, "Now", now(), vec![a.id]).await;

        assert_eq!(h.scheduler.register(&past), Registration::Stale);
        assert_eq!(h.scheduler.register(&exact), Registration::Stale);
        assert!(h.scheduler.pending().is_empty());

        advance(86_400).await;
        assert_eq!(h.sender.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_at_the_trigger_minute() {
        let h = harness(RecordingSender::new("+919999999999"));
        let a = h.store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);
        let reminder = create(&h.store, "Pay Invoice", now() + ChronoDuration::minutes(2), vec![a.id]).await;

        let Registration::Scheduled { fire_at, trigger } = h.scheduler.register(&reminder) else {
            panic!("expected the reminder to be scheduled");
        };
        // 04:32 UTC is 10:02 IST
        assert_eq!(trigger.to_string(), "2 10 19 10 *");
        assert!(trigger.matches(fire_at, Kolkata));
        assert!(h.scheduler.is_scheduled(reminder.id));

        advance(119).await;
        assert_eq!(h.sender.attempts(), 0);

        advance(2).await;
        let sent = h.sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@example.com");
        assert_eq!(sent[0].subject.as_deref(), Some("Reminder: Pay Invoice"));
        assert!(sent[0].body.contains("Due tomorrow"));
        assert!(!h.scheduler.is_scheduled(reminder.id));

        advance(365 * 86_400).await;
        assert_eq!(h.sender.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_time_inside_current_minute_fires_immediately() {
        let h = harness(RecordingSender::new("+919999999999"));
        let a = h.store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);
        let reminder = create(&h.store, "Soon", now() + ChronoDuration::seconds(30), vec![a.id]).await;

        assert!(matches!(h.scheduler.register(&reminder), Registration::Scheduled { .. }));
        advance(1).await;
        assert_eq!(h.sender.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregistering_replaces_the_pending_timer() {
        let h = harness(RecordingSender::new("+919999999999"));
        let a = h.store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);
        let reminder = create(&h.store, "Pay Invoice", now() + ChronoDuration::minutes(2), vec![a.id]).await;
        h.scheduler.register(&reminder);

        let moved = h
            .store
            .update(
                reminder.id,
                &UpdateReminderRequest {
                    date: Some(now() + ChronoDuration::minutes(5)),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        h.scheduler.register(&moved);
        assert_eq!(h.scheduler.pending().len(), 1);

        advance(180).await;
        assert_eq!(h.sender.attempts(), 0);

        advance(150).await;
        assert_eq!(h.sender.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_after_registration_are_picked_up_at_fire_time() {
        let h = harness(RecordingSender::new("+919999999999"));
        let a = h.store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);
        let b = h.store.add_customer("B", Some("b@example.com"), None, &[DeliveryChannel::Email]);
        let reminder = create(&h.store, "Pay Invoice", now() + ChronoDuration::minutes(2), vec![a.id]).await;
        h.scheduler.register(&reminder);

        h.store
            .update(
                reminder.id,
                &UpdateReminderRequest {
                    title: Some("Pay Invoice Today".into()),
                    recipients: Some(vec![b.id]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        advance(121).await;
        let sent = h.sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "b@example.com");
        assert_eq!(sent[0].subject.as_deref(), Some("Reminder: Pay Invoice Today"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_reminder_does_not_fire() {
        let h = harness(RecordingSender::new("+919999999999"));
        let a = h.store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);
        let reminder = create(&h.store, "Pay Invoice", now() + ChronoDuration::minutes(2), vec![a.id]).await;
        h.scheduler.register(&reminder);

        // Delete without telling the scheduler: the reload at fire time guards it.
        h.store.delete(reminder.id).await.unwrap();
        advance(121).await;

        assert_eq!(h.sender.attempts(), 0);
        assert!(!h.scheduler.is_scheduled(reminder.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_shutdown_drop_timers() {
        let h = harness(RecordingSender::new("+919999999999"));
        let a = h.store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);
        let first = create(&h.store, "First", now() + ChronoDuration::minutes(2), vec![a.id]).await;
        let second = create(&h.store, "Second", now() + ChronoDuration::minutes(3), vec![a.id]).await;
        h.scheduler.register(&first);
        h.scheduler.register(&second);

        assert!(h.scheduler.cancel(first.id));
        assert!(!h.scheduler.cancel(first.id));
        assert_eq!(h.scheduler.pending()[0].reminder_id, second.id);

        h.scheduler.shutdown();
        assert!(h.scheduler.pending().is_empty());

        advance(600).await;
        assert_eq!(h.sender.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_delivery_does_not_stop_the_fire_event() {
        let h = harness(RecordingSender::new("+919999999999").failing_for("+919876543210"));
        let a = h.store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);
        let b = h.store.add_customer("B", None, Some("98765 43210"), &[DeliveryChannel::Phone]);
        let c = h.store.add_customer("C", Some("c@example.com"), None, &[DeliveryChannel::Email]);
        let reminder = create(
            &h.store,
            "Pay Invoice",
            now() + ChronoDuration::minutes(2),
            vec![a.id, b.id, c.id],
        )
        .await;
        h.scheduler.register(&reminder);

        advance(121).await;
        assert_eq!(h.sender.attempts(), 3);
        let to: Vec<_> = h.sender.sent().into_iter().map(|s| s.to).collect();
        assert_eq!(to, vec!["a@example.com", "c@example.com"]);
    }

    #[tokio::test]
    async fn test_deliver_now() {
        let h = harness(RecordingSender::new("+919999999999"));
        let a = h.store.add_customer("A", Some("a@example.com"), Some("12345"), &[
            DeliveryChannel::Email,
            DeliveryChannel::Whatsapp,
        ]);
        let reminder = create(&h.store, "Pay Invoice", now() + ChronoDuration::days(3), vec![a.id]).await;

        let summary = h.scheduler.deliver_now(reminder.id).await.unwrap();
        assert_eq!(summary, FireSummary { sent: 1, skipped: 1, failed: 0 });

        let empty = create(&h.store, "Nobody", now() + ChronoDuration::days(3), vec![]).await;
        assert!(matches!(
            h.scheduler.deliver_now(empty.id).await,
            Err(DeliveryError::NoRecipients(_))
        ));
        assert!(matches!(
            h.scheduler.deliver_now(Uuid::new_v4()).await,
            Err(DeliveryError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduled_into_the_past_never_fires() {
        let h = harness(RecordingSender::new("+919999999999"));
        let a = h.store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);
        let reminder = create(&h.store, "Pay Invoice", now() + ChronoDuration::minutes(2), vec![a.id]).await;
        h.scheduler.register(&reminder);

        let moved = h
            .store
            .update(
                reminder.id,
                &UpdateReminderRequest {
                    date: Some(now() - ChronoDuration::minutes(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.scheduler.register(&moved), Registration::Stale);
        assert!(!h.scheduler.is_scheduled(reminder.id));

        advance(121).await;
        assert_eq!(h.sender.attempts(), 0);
    }

    /// Store whose reload fails for reminders titled "Broken".
    struct BrokenReloadStore {
        inner: Arc<InMemoryReminderStore>,
    }

    #[async_trait::async_trait]
    impl ReminderStore for BrokenReloadStore {
        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Reminder>> {
            self.inner.find_by_id(id).await
        }

        async fn find_populated(&self, id: Uuid) -> anyhow::Result<Option<PopulatedReminder>> {
            let populated = self.inner.find_populated(id).await?;
            if populated.as_ref().is_some_and(|p| p.reminder.title == "Broken") {
                anyhow::bail!("connection reset while loading reminder {id}");
            }
            Ok(populated)
        }

        async fn find(&self, query: &ReminderQuery) -> anyhow::Result<Vec<Reminder>> {
            self.inner.find(query).await
        }

        async fn insert(&self, req: &CreateReminderRequest) -> anyhow::Result<Reminder> {
            self.inner.insert(req).await
        }

        async fn update(
            &self,
            id: Uuid,
            req: &UpdateReminderRequest,
        ) -> anyhow::Result<Option<Reminder>> {
            self.inner.update(id, req).await
        }

        async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reload_does_not_affect_other_reminders() {
        let store = Arc::new(InMemoryReminderStore::new());
        let sender = Arc::new(RecordingSender::new("+919999999999"));
        let scheduler = ReminderScheduler::new(
            Arc::new(BrokenReloadStore { inner: store.clone() }),
            Arc::new(Dispatcher::new(ChannelSenders {
                email: Some(sender.clone() as Arc<dyn EmailSender>),
                ..Default::default()
            })),
            Arc::new(FixedClock(now())),
            Kolkata,
        );
        let a = store.add_customer("A", Some("a@example.com"), None, &[DeliveryChannel::Email]);
        let broken = create(&store, "Broken", now() + ChronoDuration::minutes(2), vec![a.id]).await;
        let healthy = create(&store, "Healthy", now() + ChronoDuration::minutes(3), vec![a.id]).await;
        scheduler.register(&broken);
        scheduler.register(&healthy);

        advance(121).await;
        assert_eq!(sender.attempts(), 0);
        assert!(!scheduler.is_scheduled(broken.id));
        assert!(scheduler.is_scheduled(healthy.id));

        advance(60).await;
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject.as_deref(), Some("Reminder: Healthy"));
    }
}
