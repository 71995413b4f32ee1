//! Collection loop driving acquisition and publishing.

use crate::error::{ReadingError, Result};
use crate::metrics::{
    acquirer::ReadingAcquirer,
    data::{TargetOutcome, TickReport},
    publisher::MetricPublisher,
    traits::CommandRunner,
};
use chrono::Utc;
use futures_util::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    /// Waiting for the next tick
    Idle,
    /// A collection cycle is in flight
    Collecting,
}

/// Periodically reads every configured target and publishes the results.
pub struct TemperatureCollector<R> {
    acquirer: ReadingAcquirer<R>,
    publisher: Arc<MetricPublisher>,
    state: LoopState,
}

impl<R: CommandRunner> TemperatureCollector<R> {
    /// Create a collector writing into `publisher`.
    pub fn new(acquirer: ReadingAcquirer<R>, publisher: Arc<MetricPublisher>) -> Self {
        Self {
            acquirer,
            publisher,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn publisher(&self) -> &Arc<MetricPublisher> {
        &self.publisher
    }

    /// Run one full collection cycle.
    ///
    /// Individual reading failures never make this return an error; they
    /// are applied to their series according to the missing-value policy.
    /// An `Err` means publishing itself failed.
    pub async fn tick(&mut self) -> Result<TickReport> {
        self.state = LoopState::Collecting;
        let result = self.collect().await;
        self.state = LoopState::Idle;
        result
    }

    async fn collect(&self) -> Result<TickReport> {
        let started = Instant::now();
        let mut report = TickReport::new(Utc::now());
        let config = self.acquirer.config();

        // One snapshot per tick, shared by every sensor target.
        if !config.sensor_targets.is_empty() {
            let snapshot = self.acquirer.fetch_sensor_snapshot().await;
            if let Err(e) = &snapshot {
                debug!("Sensor snapshot unavailable: {}", e);
            }
            for target in &config.sensor_targets {
                let reading = match &snapshot {
                    Ok(snapshot) => self.acquirer.read_sensor_target(snapshot, target),
                    Err(e) => Err(e.clone()),
                };
                report
                    .outcomes
                    .push(self.apply(&target.metric, &target.label_value, reading)?);
            }
        }

        for target in &config.disk_targets {
            let reading = self.acquirer.fetch_disk_temperature(&target.device).await;
            report
                .outcomes
                .push(self.apply(&target.metric, &target.label_value, reading)?);
        }

        let elapsed = started.elapsed();
        self.publisher.observe_collection(elapsed);
        report.duration_ms = elapsed.as_millis() as u64;
        Ok(report)
    }

    fn apply(
        &self,
        metric: &str,
        label_value: &str,
        reading: std::result::Result<f64, ReadingError>,
    ) -> Result<TargetOutcome> {
        let (value, failure) = match reading {
            Ok(value) => {
                self.publisher.publish(metric, label_value, value)?;
                (Some(value), None)
            }
            Err(e) => {
                self.publisher.mark_unavailable(metric, label_value, &e)?;
                (None, Some(e.kind().to_string()))
            }
        };
        Ok(TargetOutcome {
            metric: metric.to_string(),
            label_value: label_value.to_string(),
            value,
            failure,
        })
    }

    /// Run one tick, absorbing both errors and panics.
    ///
    /// Returns `false` if the tick failed; the state is always `Idle`
    /// afterwards.
    pub async fn guarded_tick(&mut self) -> bool {
        let outcome = AssertUnwindSafe(self.tick()).catch_unwind().await;
        self.state = LoopState::Idle;

        match outcome {
            Ok(Ok(report)) => {
                debug!(
                    "Collection cycle done in {}ms: {} published, {} missing",
                    report.duration_ms,
                    report.published(),
                    report.missing()
                );
                true
            }
            Ok(Err(e)) => {
                error!("Collection cycle failed: {}", e);
                false
            }
            Err(panic) => {
                error!("Collection cycle panicked: {}", panic_message(panic.as_ref()));
                false
            }
        }
    }

    /// Collect on every interval until `shutdown` flips to `true` or its
    /// sender is dropped.
    ///
    /// A failed cycle is followed by the configured cool-down, after which
    /// the interval restarts: the next tick comes one full interval after the
    /// cool-down ends.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let interval_period = self.acquirer.config().interval();
        let cooldown = self.acquirer.config().cooldown();
        let mut interval = time::interval(interval_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Started temperature collection with {:?} interval",
            interval_period
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            if !self.guarded_tick().await {
                info!("Pausing collection for {:?}", cooldown);
                tokio::select! {
                    _ = time::sleep(cooldown) => {}
                    _ = shutdown.changed() => break,
                }
                interval.reset();
            }
        }

        info!("Temperature collection stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
