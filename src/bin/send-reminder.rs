/// Deliver one reminder immediately, bypassing its timer.
/// Useful to re-send after a restart dropped the pending timer.
///
/// Usage: send-reminder --id UUID

use std::sync::Arc;

use clap::Parser;
use uuid::Uuid;

use reminder_api::{
    config::Config,
    db::{self, PgReminderStore},
    services::{
        channels::ChannelSenders, clock::SystemClock, dispatch::Dispatcher,
        scheduler::ReminderScheduler,
    },
};

#[derive(Parser)]
#[command(name = "send-reminder", about = "Send a stored reminder to its recipients now")]
struct Args {
    /// Reminder id
    #[arg(long)]
    id: Uuid,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    let scheduler = ReminderScheduler::new(
        Arc::new(PgReminderStore::new(pool)),
        Arc::new(Dispatcher::new(ChannelSenders::from_config(&config))),
        Arc::new(SystemClock),
        config.timezone,
    );

    let summary = scheduler.deliver_now(args.id).await?;
    tracing::info!(
        "Reminder {}: {} sent, {} skipped, {} failed",
        args.id,
        summary.sent,
        summary.skipped,
        summary.failed
    );

    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
