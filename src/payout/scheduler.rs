// Payout Scheduler - fires payout cycles on a wall-clock cadence
//
// Slots are multiples of the interval counted from UTC midnight, so a 30
// minute interval fires at :00 and :30 of every hour and a 1440 minute
// interval fires once a day at 00:00 UTC. Each fire spawns its cycle; the
// orchestrator drops a fire that lands while a cycle is still running.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{error, info};

use super::orchestrator::PayoutOrchestrator;

/// Payout schedule configuration
#[derive(Debug, Clone)]
pub struct PayoutScheduleConfig {
    /// Minutes between payout slots (5..=1440)
    pub interval_minutes: u32,
    /// How often to log the time left until the next slot
    pub progress_interval: Duration,
}

/// Wall-clock source the slots are computed from
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Payout scheduler - owns nothing but the timer
pub struct PayoutScheduler {
    config: PayoutScheduleConfig,
    orchestrator: Arc<PayoutOrchestrator>,
    clock: Clock,
}

/// Running scheduler. Dropping it stops the timer too; `stop` also waits
/// for any cycle in flight.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("❌ Payout scheduler task ended abnormally: {:?}", e);
        }
    }
}

impl PayoutScheduler {
    pub fn new(config: PayoutScheduleConfig, orchestrator: Arc<PayoutOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Start the scheduler (runs in background)
    pub fn start(&self) -> SchedulerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let config = self.config.clone();
        let orchestrator = self.orchestrator.clone();
        let clock = self.clock.clone();

        let task = tokio::spawn(async move {
            Self::run(config, orchestrator, clock, shutdown_rx).await;
        });

        SchedulerHandle { shutdown, task }
    }

    async fn run(
        config: PayoutScheduleConfig,
        orchestrator: Arc<PayoutOrchestrator>,
        clock: Clock,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let interval = config.interval_minutes;
        let mut cycles = JoinSet::new();

        let mut next_fire = next_fire_after(clock(), interval);
        info!(
            "⏰ Payouts every {} minutes, next at {} UTC",
            interval,
            next_fire.format("%H:%M:%S")
        );

        let mut progress = tokio::time::interval(config.progress_interval);
        progress.set_missed_tick_behavior(MissedTickBehavior::Skip);
        progress.tick().await;

        loop {
            let wait = (next_fire - clock()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("🛑 Payout scheduler stopping");
                    break;
                }
                _ = progress.tick() => {
                    info!(
                        "⏳ Next payout in {} minute(s)",
                        minutes_until_next(clock(), interval)
                    );
                }
                Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                    if let Err(e) = joined {
                        error!("❌ Payout cycle task panicked: {:?}", e);
                    }
                }
                _ = tokio::time::sleep(wait) => {
                    let orchestrator = orchestrator.clone();
                    cycles.spawn(async move {
                        orchestrator.run_cycle().await;
                    });

                    // Never re-fire the same slot if the wall clock lags the timer
                    next_fire = next_fire_after(clock().max(next_fire), interval);
                    info!("⏰ Next payout at {} UTC", next_fire.format("%H:%M:%S"));
                }
            }
        }

        while let Some(joined) = cycles.join_next().await {
            if let Err(e) = joined {
                error!("❌ Payout cycle task panicked: {:?}", e);
            }
        }
    }
}

fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}

/// First slot strictly after `now`
pub fn next_fire_after(now: DateTime<Utc>, interval_minutes: u32) -> DateTime<Utc> {
    let start = day_start(now);
    let interval = i64::from(interval_minutes.max(1));
    let elapsed = (now - start).num_minutes();

    let candidate = start + ChronoDuration::minutes((elapsed / interval + 1) * interval);
    let next_midnight = start + ChronoDuration::days(1);

    // Slots restart at midnight when the interval does not divide a day
    candidate.min(next_midnight)
}

/// Whole minutes until the next slot, rounded up
pub fn minutes_until_next(now: DateTime<Utc>, interval_minutes: u32) -> i64 {
    let seconds = (next_fire_after(now, interval_minutes) - now).num_seconds();
    (seconds + 59) / 60
}
