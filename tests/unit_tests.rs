use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use hwtemp_exporter::{
    extract_field, web::create_app, CommandOutput, CommandRunner, DiskTarget, ExporterConfig,
    FieldPath, LoopState, MetricPublisher, MissingPolicy, ReadingAcquirer, ReadingError,
    SensorSnapshot, TemperatureCollector, ToolCommand, WebConfig,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tower::ServiceExt;

type Reply = Result<CommandOutput, ReadingError>;

/// Fake tool runner answering from per-tool scripts.
///
/// Each tool's replies are consumed in order; the last reply repeats.
#[derive(Default)]
struct ScriptedRunner {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedRunner {
    fn new() -> Self {
        Self::default()
    }

    fn script(self, tool: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(tool.to_string(), replies.into());
        self
    }

    fn stdout(self, tool: &str, text: &str) -> Self {
        self.script(tool, vec![Ok(CommandOutput::success(text))])
    }

    fn calls(&self, tool: &str) -> usize {
        self.calls.lock().unwrap().get(tool).copied().unwrap_or(0)
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &ToolCommand) -> Reply {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(command.name.clone())
            .or_insert(0) += 1;

        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.entry(command.name.clone()).or_default();
        let reply = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        reply.unwrap_or_else(|| {
            Err(ReadingError::tool_unavailable(
                command.name.clone(),
                "command not found",
            ))
        })
    }
}

const SENSORS_OUTPUT: &str = r#"{
   "k10temp-pci-00c3":{
      "Adapter": "PCI adapter",
      "Tctl":{
         "temp1_input": 62.500
      }
   },
   "nvme-pci-0400":{
      "Adapter": "PCI adapter",
      "Composite":{
         "temp1_input": 40.850,
         "temp1_max": 83.850,
         "temp1_min": -5.150,
         "temp1_crit": 84.850,
         "temp1_alarm": 0.000
      }
   },
   "mt7921_phy0-pci-0300":{
      "Adapter": "PCI adapter",
      "temp1":{
         "temp1_input": 47.000
      }
   }
}"#;

fn test_config() -> ExporterConfig {
    ExporterConfig::default()
        .with_disk_retry(3, Duration::ZERO)
        .with_cooldown_secs(0)
}

fn collector_with(
    runner: Arc<ScriptedRunner>,
    config: ExporterConfig,
) -> TemperatureCollector<Arc<ScriptedRunner>> {
    let publisher = Arc::new(MetricPublisher::new(&config).expect("Should register metrics"));
    TemperatureCollector::new(ReadingAcquirer::new(runner, config), publisher)
}

fn path(p: &str) -> FieldPath {
    FieldPath::new(p).expect("Should be a valid field path")
}

/// Test that malformed or empty sensor output never escapes as a panic
#[tokio::test]
async fn test_malformed_sensor_output_is_failure() {
    let outputs = [
        "",
        "\n",
        "null",
        "42",
        "\"k10temp\"",
        "[{\"Tctl\": 1}]",
        "{\"k10temp-pci-00c3\": {\"Tctl\": ",
        "k10temp-pci-00c3\nAdapter: PCI adapter\nTctl: +62.5°C",
    ];
    for output in outputs {
        let runner = ScriptedRunner::new().stdout("sensors", output);
        let acquirer = ReadingAcquirer::new(runner, test_config());
        let result = acquirer.fetch_sensor_snapshot().await;
        assert!(
            matches!(result, Err(ReadingError::MalformedOutput { .. })),
            "output {:?} gave {:?}",
            output,
            result
        );
    }
}

/// Test that a sensors run that fails or cannot start is a tool failure
#[tokio::test]
async fn test_sensor_tool_failures() {
    let runner = ScriptedRunner::new().script(
        "sensors",
        vec![Ok(CommandOutput {
            status: Some(1),
            stdout: b"No sensors found!".to_vec(),
        })],
    );
    let acquirer = ReadingAcquirer::new(runner, test_config());
    assert!(matches!(
        acquirer.fetch_sensor_snapshot().await,
        Err(ReadingError::ToolUnavailable { .. })
    ));

    let acquirer = ReadingAcquirer::new(ScriptedRunner::new(), test_config());
    assert!(matches!(
        acquirer.fetch_sensor_snapshot().await,
        Err(ReadingError::ToolUnavailable { .. })
    ));
}

/// Test that degree-sign artifacts are stripped before parsing
#[tokio::test]
async fn test_sensor_output_with_encoding_artifacts() {
    let output = "{\"k10temp-pci-00c3\":{\"Adapter\":\"PCI adapter \u{00C2}\u{00B0}C\",\"Tctl\":{\"temp1_input\":58.25}}}";
    let runner = ScriptedRunner::new().stdout("sensors", output);
    let acquirer = ReadingAcquirer::new(runner, test_config());

    let snapshot = assert_ok!(acquirer.fetch_sensor_snapshot().await);
    assert_eq!(
        extract_field(&snapshot, &path("k10temp-pci-00c3.Tctl.temp1_input")),
        Ok(58.25)
    );
}

/// Test the documented extraction scenario
#[test]
fn test_extract_field_scenario() {
    let snapshot =
        SensorSnapshot::parse(r#"{"k10temp-pci-00c3":{"Tctl":{"temp1_input":62.5}}}"#).unwrap();
    let value = assert_ok!(extract_field(
        &snapshot,
        &path("k10temp-pci-00c3.Tctl.temp1_input")
    ));
    assert_eq!(value, 62.5);
}

/// Test that paths absent from a snapshot are reported as missing
#[test]
fn test_absent_paths_are_missing() {
    let snapshot = SensorSnapshot::parse(SENSORS_OUTPUT).unwrap();
    let absent = [
        "coretemp-isa-0000.Package id 0.temp1_input",
        "nvme-pci-0400.Sensor 1.temp2_input",
        "nvme-pci-0400.Composite.temp1_input.value",
        "nvme-pci-0400.Adapter",
        "nvme-pci-0400",
        "k10temp-pci-00c3.Tctl.temp1_crit",
    ];
    for p in absent {
        assert!(
            matches!(
                extract_field(&snapshot, &path(p)),
                Err(ReadingError::FieldMissing { .. })
            ),
            "path {} should be missing",
            p
        );
    }

    let empty = SensorSnapshot::parse("{}").unwrap();
    assert!(empty.is_empty());
    assert_err!(extract_field(
        &empty,
        &path("nvme-pci-0400.Composite.temp1_input")
    ));
}

/// Test the plausibility bounds on disk readings
#[tokio::test]
async fn test_disk_values_outside_bounds_rejected() {
    for value in ["-41", "-100", "150.5", "200", "1e6"] {
        let output = format!(r#"{{"temperature":{{"current":{}}}}}"#, value);
        let runner = ScriptedRunner::new().stdout("smartctl", &output);
        let acquirer = ReadingAcquirer::new(runner, test_config());
        assert!(
            matches!(
                acquirer.fetch_disk_temperature("/dev/sda").await,
                Err(ReadingError::OutOfRange { .. })
            ),
            "value {} should be rejected",
            value
        );
    }

    for (value, expected) in [("-40", -40.0), ("150", 150.0), ("45", 45.0)] {
        let output = format!(r#"{{"temperature":{{"current":{}}}}}"#, value);
        let runner = ScriptedRunner::new().stdout("smartctl", &output);
        let acquirer = ReadingAcquirer::new(runner, test_config());
        assert_eq!(
            acquirer.fetch_disk_temperature("/dev/sda").await,
            Ok(expected)
        );
    }
}

/// Test that a disk tool failing twice then succeeding is invoked exactly three times
#[tokio::test]
async fn test_disk_retry_bound_then_publish() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .stdout("sensors", SENSORS_OUTPUT)
            .script(
                "smartctl",
                vec![
                    Err(ReadingError::tool_unavailable("smartctl", "timed out after 5s")),
                    Ok(CommandOutput {
                        status: Some(2),
                        stdout: Vec::new(),
                    }),
                    Ok(CommandOutput::success(r#"{"temperature":{"current":36}}"#)),
                ],
            ),
    );
    let mut collector = collector_with(runner.clone(), test_config());

    let report = assert_ok!(collector.tick().await);
    assert_eq!(runner.calls("smartctl"), 3);
    assert_eq!(runner.calls("sensors"), 1);
    assert_eq!(
        report.outcome("ssd_temperature", "Samsung_T5").unwrap().value,
        Some(36.0)
    );
    assert_eq!(
        collector
            .publisher()
            .current_value("ssd_temperature", "Samsung_T5"),
        Some(36.0)
    );
}

/// Test that a persistently failing disk tool stops after the retry bound
#[tokio::test]
async fn test_disk_retry_gives_up() {
    let runner = Arc::new(ScriptedRunner::new().stdout("smartctl", "not json"));
    let acquirer = ReadingAcquirer::new(runner.clone(), test_config());
    assert!(matches!(
        acquirer.fetch_disk_temperature("/dev/sda").await,
        Err(ReadingError::MalformedOutput { .. })
    ));
    assert_eq!(runner.calls("smartctl"), 3);
}

/// Test that a tick where every acquisition fails still completes
#[tokio::test]
async fn test_tick_with_total_failure_returns_to_idle() {
    let runner = Arc::new(ScriptedRunner::new());
    let mut collector = collector_with(runner.clone(), test_config());

    let report = assert_ok!(collector.tick().await);
    assert_eq!(report.published(), 0);
    assert_eq!(report.missing(), 4);
    assert_eq!(collector.state(), LoopState::Idle);
    assert_eq!(runner.calls("sensors"), 1);

    // The next tick runs normally once the tools come back.
    runner
        .scripts
        .lock()
        .unwrap()
        .insert("sensors".into(), vec![Ok(CommandOutput::success(SENSORS_OUTPUT))].into());
    let report = assert_ok!(collector.tick().await);
    assert_eq!(report.published(), 3);
    assert_eq!(collector.state(), LoopState::Idle);
}

/// Test both missing-value policies on an empty snapshot
#[tokio::test]
async fn test_empty_snapshot_under_both_policies() {
    for (policy, expected) in [
        (MissingPolicy::Retain, Some(40.85)),
        (MissingPolicy::Sentinel(0.0), Some(0.0)),
        (MissingPolicy::Sentinel(-1.0), Some(-1.0)),
    ] {
        let runner = Arc::new(
            ScriptedRunner::new()
                .script(
                    "sensors",
                    vec![
                        Ok(CommandOutput::success(SENSORS_OUTPUT)),
                        Ok(CommandOutput::success("{}")),
                    ],
                )
                .stdout("smartctl", r#"{"temperature":{"current":30}}"#),
        );
        let mut collector = collector_with(runner, test_config().with_missing_policy(policy));

        assert_ok!(collector.tick().await);
        let report = assert_ok!(collector.tick().await);

        let nvme = report.outcome("nvme_temperature", "nvme0").unwrap();
        assert_eq!(nvme.failure.as_deref(), Some("field_missing"));
        assert_eq!(
            collector
                .publisher()
                .current_value("nvme_temperature", "nvme0"),
            expected,
            "policy {}",
            policy
        );
    }
}

/// Test per-metric policy overrides
#[tokio::test]
async fn test_policy_override_per_metric() {
    let runner = Arc::new(ScriptedRunner::new().stdout("sensors", "{}"));
    let config = test_config()
        .with_missing_policy(MissingPolicy::Sentinel(0.0))
        .with_policy_override("ssd_temperature", MissingPolicy::Retain);
    let mut collector = collector_with(runner, config);

    assert_ok!(collector.tick().await);
    let publisher = collector.publisher();
    assert_eq!(publisher.current_value("cpu_temperature", "k10temp"), Some(0.0));
    assert_eq!(publisher.current_value("ssd_temperature", "Samsung_T5"), None);
}

/// Test the disk acceptance scenario end to end
#[tokio::test]
async fn test_disk_scenarios() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .stdout("sensors", "{}")
            .stdout("smartctl", r#"{"temperature":{"current":45}}"#),
    );
    let mut collector = collector_with(runner, test_config());
    assert_ok!(collector.tick().await);
    assert_eq!(
        collector
            .publisher()
            .current_value("ssd_temperature", "Samsung_T5"),
        Some(45.0)
    );

    let runner = Arc::new(
        ScriptedRunner::new()
            .stdout("sensors", "{}")
            .stdout("smartctl", r#"{"temperature":{"current":200}}"#),
    );
    let mut collector = collector_with(runner.clone(), test_config());
    let report = assert_ok!(collector.tick().await);
    let ssd = report.outcome("ssd_temperature", "Samsung_T5").unwrap();
    assert_eq!(ssd.value, None);
    assert_eq!(ssd.failure.as_deref(), Some("out_of_range"));
    assert_eq!(runner.calls("smartctl"), 1);
}

/// Test that several disks are each queried with their own device path
#[tokio::test]
async fn test_multiple_disk_targets() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .stdout("sensors", "{}")
            .stdout("smartctl", r#"{"temperature":{"current":29}}"#),
    );
    let config = test_config().with_disk_targets(vec![
        DiskTarget::new("ssd_temperature", "Samsung_T5", "/dev/sda"),
        DiskTarget::new("ssd_temperature", "Crucial_X6", "/dev/sdb"),
    ]);
    let mut collector = collector_with(runner.clone(), config);

    let report = assert_ok!(collector.tick().await);
    assert_eq!(report.published(), 2);
    assert_eq!(runner.calls("smartctl"), 2);
}

/// Test the scrape output after publishing a value
#[tokio::test]
async fn test_render_scenario_over_http() {
    let publisher = Arc::new(MetricPublisher::new(&test_config()).unwrap());
    publisher.publish("cpu_temperature", "k10temp", 55.0).unwrap();

    let app = create_app(&WebConfig::default(), publisher);
    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(text.contains("# HELP cpu_temperature "));
    assert!(text.contains("# TYPE cpu_temperature gauge"));
    let line = text
        .lines()
        .find(|l| l.starts_with("cpu_temperature{chip=\"k10temp\"} "))
        .expect("Should expose the published series");
    let value: f64 = line.split_whitespace().last().unwrap().parse().unwrap();
    assert_eq!(value, 55.0);
}

/// Test that the self-observability metrics are exposed after a tick
#[tokio::test]
async fn test_failure_counter_exposed() {
    let runner = Arc::new(ScriptedRunner::new().stdout("sensors", "{}"));
    let mut collector = collector_with(runner, test_config());
    assert_ok!(collector.tick().await);

    let text = collector.publisher().render().unwrap();
    assert!(text.contains("hwtemp_collection_duration_seconds"));
    assert!(text.contains(
        "hwtemp_reading_failures_total{metric=\"cpu_temperature\",reason=\"field_missing\"} 1"
    ));
    assert!(text.contains(
        "hwtemp_reading_failures_total{metric=\"ssd_temperature\",reason=\"tool_unavailable\"} 1"
    ));
}
