use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, CounterVec, Gauge};

lazy_static! {
    pub static ref FIRE_EVENTS_COUNTER: CounterVec = register_counter_vec!(
        "reminder_fire_events_total",
        "Reminder fire events by outcome (dispatched, missing, failed)",
        &["outcome"]
    ).unwrap();

    pub static ref DELIVERIES_COUNTER: CounterVec = register_counter_vec!(
        "reminder_deliveries_total",
        "Per-recipient deliveries by channel and outcome (sent, skipped, failed)",
        &["channel", "outcome"]
    ).unwrap();

    pub static ref PENDING_TIMERS_GAUGE: Gauge = register_gauge!(
        "reminder_pending_timers",
        "Reminders currently waiting for their fire time"
    ).unwrap();
}
