//! Gauge registry and Prometheus text exposition.

use crate::config::{ExporterConfig, MissingPolicy};
use crate::error::{ExporterError, ReadingError, Result};
use crate::metrics::data::{MetricDefinition, METRIC_DEFINITIONS};
use prometheus::{Encoder, Gauge, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Owns the gauge families and the registry they are exposed from.
///
/// The collection loop is the only writer. Scrapes call [`render`] from
/// other tasks; gauge values are atomics inside the prometheus crate, so a
/// scrape never observes a half-written value.
///
/// [`render`]: MetricPublisher::render
pub struct MetricPublisher {
    registry: Registry,
    gauges: HashMap<&'static str, (MetricDefinition, GaugeVec)>,
    failures: IntCounterVec,
    collection_duration: Gauge,
    default_policy: MissingPolicy,
    policy_overrides: HashMap<String, MissingPolicy>,
    warn_after_misses: u32,
    misses: Mutex<HashMap<(String, String), u32>>,
}

impl MetricPublisher {
    /// Register every gauge family and the exporter's own metrics.
    pub fn new(config: &ExporterConfig) -> Result<Self> {
        let registry = Registry::new();

        let mut gauges = HashMap::new();
        for definition in METRIC_DEFINITIONS {
            let vec = GaugeVec::new(
                Opts::new(definition.name, definition.help),
                &[definition.label],
            )?;
            registry.register(Box::new(vec.clone()))?;
            gauges.insert(definition.name, (definition, vec));
        }

        let failures = IntCounterVec::new(
            Opts::new(
                "hwtemp_reading_failures_total",
                "Readings that could not be obtained, by metric and reason",
            ),
            &["metric", "reason"],
        )?;
        registry.register(Box::new(failures.clone()))?;

        let collection_duration = Gauge::new(
            "hwtemp_collection_duration_seconds",
            "Wall-clock duration of the last collection cycle",
        )?;
        registry.register(Box::new(collection_duration.clone()))?;

        Ok(Self {
            registry,
            gauges,
            failures,
            collection_duration,
            default_policy: config.missing_policy,
            policy_overrides: config.policy_overrides.clone(),
            warn_after_misses: config.warn_after_misses,
            misses: Mutex::new(HashMap::new()),
        })
    }

    fn gauge(&self, metric: &str) -> Result<&GaugeVec> {
        self.gauges
            .get(metric)
            .map(|(_, vec)| vec)
            .ok_or_else(|| ExporterError::UnknownMetric(metric.to_string()))
    }

    /// Definition of a registered metric.
    pub fn definition(&self, metric: &str) -> Option<&MetricDefinition> {
        self.gauges.get(metric).map(|(definition, _)| definition)
    }

    /// Missing-value policy applied to `metric`.
    pub fn policy_for(&self, metric: &str) -> MissingPolicy {
        self.policy_overrides
            .get(metric)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Overwrite a series with a fresh reading.
    pub fn publish(&self, metric: &str, label_value: &str, value: f64) -> Result<()> {
        self.gauge(metric)?.with_label_values(&[label_value]).set(value);
        self.record_success(metric, label_value);
        Ok(())
    }

    /// Record that a series has no reading this tick and apply its policy.
    pub fn mark_unavailable(
        &self,
        metric: &str,
        label_value: &str,
        reason: &ReadingError,
    ) -> Result<()> {
        let gauge = self.gauge(metric)?;
        self.failures
            .with_label_values(&[metric, reason.kind()])
            .inc();

        match self.policy_for(metric) {
            MissingPolicy::Retain => {}
            MissingPolicy::Sentinel(value) => gauge.with_label_values(&[label_value]).set(value),
        }

        self.record_miss(metric, label_value, reason);
        Ok(())
    }

    /// Store how long the last collection cycle took.
    pub fn observe_collection(&self, duration: Duration) {
        self.collection_duration.set(duration.as_secs_f64());
    }

    /// Current value of a series, if it has ever been written.
    pub fn current_value(&self, metric: &str, label_value: &str) -> Option<f64> {
        let label = self.definition(metric)?.label;
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == metric)
            .flat_map(|family| family.get_metric())
            .find(|m| {
                m.get_label()
                    .iter()
                    .any(|pair| pair.get_name() == label && pair.get_value() == label_value)
            })
            .map(|m| m.get_gauge().get_value())
    }

    /// Total failures recorded for a metric and reason.
    pub fn failure_count(&self, metric: &str, reason: &str) -> u64 {
        self.failures.with_label_values(&[metric, reason]).get()
    }

    /// Serialize every registered family in the text exposition format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| ExporterError::Metrics(prometheus::Error::Msg(e.to_string())))
    }

    /// Content type of [`render`](MetricPublisher::render) output.
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn record_miss(&self, metric: &str, label_value: &str, reason: &ReadingError) {
        let mut misses = self.misses.lock().unwrap_or_else(PoisonError::into_inner);
        let count = misses
            .entry((metric.to_string(), label_value.to_string()))
            .or_insert(0);
        *count += 1;

        if self.warns_at(*count) {
            warn!(
                "No reading for {}{{{}}} in {} consecutive ticks: {}",
                metric, label_value, count, reason
            );
        } else {
            debug!(
                "No reading for {}{{{}}} ({} consecutive): {}",
                metric, label_value, count, reason
            );
        }
    }

    fn record_success(&self, metric: &str, label_value: &str) {
        let mut misses = self.misses.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = misses.remove(&(metric.to_string(), label_value.to_string())) {
            if self.has_warned(count) {
                info!(
                    "Reading for {}{{{}}} recovered after {} missed ticks",
                    metric, label_value, count
                );
            }
        }
    }

    /// Whether reaching `count` consecutive misses logs the warning.
    /// A threshold of 0 disables it.
    fn warns_at(&self, count: u32) -> bool {
        self.warn_after_misses > 0 && count == self.warn_after_misses
    }

    /// Whether a run of `count` misses was long enough to have warned.
    fn has_warned(&self, count: u32) -> bool {
        self.warn_after_misses > 0 && count >= self.warn_after_misses
    }

    /// Consecutive misses currently recorded for a series.
    pub fn consecutive_misses(&self, metric: &str, label_value: &str) -> u32 {
        self.misses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(metric.to_string(), label_value.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher(policy: MissingPolicy) -> MetricPublisher {
        let config = ExporterConfig::default().with_missing_policy(policy);
        MetricPublisher::new(&config).unwrap()
    }

    fn missing() -> ReadingError {
        ReadingError::field_missing("nvme-pci-0400.Composite.temp1_input")
    }

    #[test]
    fn test_publish_overwrites() {
        let publisher = publisher(MissingPolicy::Retain);
        publisher.publish("cpu_temperature", "k10temp", 50.0).unwrap();
        publisher.publish("cpu_temperature", "k10temp", 61.25).unwrap();
        assert_eq!(publisher.current_value("cpu_temperature", "k10temp"), Some(61.25));
    }

    #[test]
    fn test_retain_policy_keeps_last_value() {
        let publisher = publisher(MissingPolicy::Retain);
        publisher.publish("nvme_temperature", "nvme0", 41.0).unwrap();
        publisher
            .mark_unavailable("nvme_temperature", "nvme0", &missing())
            .unwrap();
        assert_eq!(publisher.current_value("nvme_temperature", "nvme0"), Some(41.0));
    }

    #[test]
    fn test_retain_policy_never_creates_series() {
        let publisher = publisher(MissingPolicy::Retain);
        publisher
            .mark_unavailable("nvme_temperature", "nvme0", &missing())
            .unwrap();
        assert_eq!(publisher.current_value("nvme_temperature", "nvme0"), None);
    }

    #[test]
    fn test_sentinel_policy_overwrites() {
        let publisher = publisher(MissingPolicy::Sentinel(-1.0));
        publisher.publish("nvme_temperature", "nvme0", 41.0).unwrap();
        publisher
            .mark_unavailable("nvme_temperature", "nvme0", &missing())
            .unwrap();
        assert_eq!(publisher.current_value("nvme_temperature", "nvme0"), Some(-1.0));
    }

    #[test]
    fn test_unknown_metric_is_rejected() {
        let publisher = publisher(MissingPolicy::Retain);
        assert!(matches!(
            publisher.publish("gpu_temperature", "amdgpu", 40.0),
            Err(ExporterError::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_render_contains_published_series() {
        let publisher = publisher(MissingPolicy::Retain);
        publisher.publish("cpu_temperature", "k10temp", 55.0).unwrap();
        let text = publisher.render().unwrap();

        assert!(text.contains("# TYPE cpu_temperature gauge"));
        let line = text
            .lines()
            .find(|l| l.starts_with("cpu_temperature{chip=\"k10temp\"} "))
            .expect("series line present");
        let value: f64 = line.rsplit(' ').next().unwrap().parse().unwrap();
        assert_eq!(value, 55.0);
    }

    #[test]
    fn test_miss_tracking_and_failure_counter() {
        let config = ExporterConfig::default().with_warn_after_misses(2);
        let publisher = MetricPublisher::new(&config).unwrap();
        for _ in 0..3 {
            publisher
                .mark_unavailable("ssd_temperature", "Samsung_T5", &missing())
                .unwrap();
        }
        assert_eq!(publisher.consecutive_misses("ssd_temperature", "Samsung_T5"), 3);
        assert_eq!(publisher.failure_count("ssd_temperature", "field_missing"), 3);

        publisher.publish("ssd_temperature", "Samsung_T5", 33.0).unwrap();
        assert_eq!(publisher.consecutive_misses("ssd_temperature", "Samsung_T5"), 0);
    }

    #[test]
    fn test_warn_threshold() {
        let publisher = publisher(MissingPolicy::Retain);
        assert!(!publisher.warns_at(4));
        assert!(publisher.warns_at(5));
        assert!(!publisher.warns_at(6));
        assert!(!publisher.has_warned(4));
        assert!(publisher.has_warned(7));

        let config = ExporterConfig::default().with_warn_after_misses(0);
        let silent = MetricPublisher::new(&config).unwrap();
        for count in [0, 1, 5, 100] {
            assert!(!silent.warns_at(count));
            assert!(!silent.has_warned(count));
        }
    }
}
