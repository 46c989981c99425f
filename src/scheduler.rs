//! Business-day scheduler.
//!
//! Fires the full pipeline for every known user at a fixed wall-clock
//! time (configured hour:minute in the configured UTC offset) on
//! Monday through Friday. One user's failure never stops the rest of
//! the batch, and a failed run is simply skipped until the next
//! trigger; there is no retry logic here.

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc, Weekday};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::locator::RepoLocks;
use crate::pipeline;
use crate::provider::TextGenerator;
use crate::store;

/// The next business-day trigger strictly after `after`.
pub fn next_trigger(after: DateTime<FixedOffset>, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    let tz = after.timezone();
    let mut day = after.date_naive();

    loop {
        let candidate = day
            .and_hms_opt(hour, minute, 0)
            .unwrap()
            .and_local_timezone(tz)
            .single();
        if let Some(candidate) = candidate {
            let weekday = candidate.weekday();
            let is_business_day = weekday != Weekday::Sat && weekday != Weekday::Sun;
            if is_business_day && candidate > after {
                return candidate;
            }
        }
        day += Duration::days(1);
    }
}

/// Generate today's report for every user with at least one binding.
pub async fn run_batch(
    config: &Config,
    pool: &SqlitePool,
    locks: &RepoLocks,
    generator: &dyn TextGenerator,
) {
    let usernames = match store::list_usernames(pool).await {
        Ok(usernames) => usernames,
        Err(e) => {
            error!("failed to enumerate users for scheduled run: {e:#}");
            return;
        }
    };

    info!(users = usernames.len(), "scheduled report run starting");

    for username in usernames {
        match pipeline::generate_report(config, pool, locks, generator, &username, None, None).await
        {
            Ok(outcome) => {
                info!(user = %username, date = %outcome.date, commits = outcome.commits, "report generated");
            }
            Err(e) => {
                // Isolate per-user failures; the batch continues
                error!(user = %username, "scheduled report failed: {e:#}");
            }
        }
    }

    info!("scheduled report run complete");
}

/// Run the scheduler loop until cancelled.
pub async fn run_scheduler(
    config: &Config,
    pool: &SqlitePool,
    locks: &RepoLocks,
    generator: &dyn TextGenerator,
    shutdown: CancellationToken,
) -> Result<()> {
    let tz = config.reports.timezone()?;

    loop {
        let now = Utc::now().with_timezone(&tz);
        let next = next_trigger(now, config.schedule.hour, config.schedule.minute);
        let wait = (next - now).to_std().unwrap_or_default();

        info!(next = %next.to_rfc3339(), "next scheduled report run");

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("scheduler shutting down");
                return Ok(());
            }
            _ = tokio::time::sleep(wait) => {
                run_batch(config, pool, locks, generator).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[test]
    fn test_same_day_before_trigger() {
        // Wednesday 2024-05-01, 10:00
        let after = tz().with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let next = next_trigger(after, 18, 15);
        assert_eq!(next.to_rfc3339(), "2024-05-01T18:15:00+08:00");
    }

    #[test]
    fn test_same_day_after_trigger_rolls_forward() {
        let after = tz().with_ymd_and_hms(2024, 5, 1, 19, 0, 0).unwrap();
        let next = next_trigger(after, 18, 15);
        assert_eq!(next.to_rfc3339(), "2024-05-02T18:15:00+08:00");
    }

    #[test]
    fn test_exact_trigger_time_rolls_forward() {
        let after = tz().with_ymd_and_hms(2024, 5, 1, 18, 15, 0).unwrap();
        let next = next_trigger(after, 18, 15);
        assert_eq!(next.to_rfc3339(), "2024-05-02T18:15:00+08:00");
    }

    #[test]
    fn test_friday_evening_skips_to_monday() {
        // Friday 2024-05-03
        let after = tz().with_ymd_and_hms(2024, 5, 3, 20, 0, 0).unwrap();
        let next = next_trigger(after, 18, 15);
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!(next.to_rfc3339(), "2024-05-06T18:15:00+08:00");
    }

    #[test]
    fn test_weekend_never_fires() {
        // Saturday morning
        let after = tz().with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap();
        let next = next_trigger(after, 18, 15);
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn test_trigger_uses_configured_time() {
        let after = tz().with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let next = next_trigger(after, 7, 30);
        assert_eq!(next.hour(), 7);
        assert_eq!(next.minute(), 30);
    }
}
