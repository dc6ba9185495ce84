pub mod channels;
pub mod clock;
pub mod dispatch;
pub mod metrics;
pub mod phone;
pub mod recipients;
pub mod reminders;
pub mod scheduler;
pub mod trigger;
