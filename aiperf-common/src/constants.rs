//! System-wide constants and default tunables.

use std::time::Duration;

/// Nanoseconds per second.
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Nanoseconds per millisecond.
pub const NANOS_PER_MILLIS: u64 = 1_000_000;

/// Default timeout applied by the request client when none is given.
pub const DEFAULT_COMMS_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for all services to respond to a ProfileConfigure command.
pub const DEFAULT_PROFILE_CONFIGURE_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for all services to respond to a ProfileStart command.
pub const DEFAULT_PROFILE_START_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for all required services to register with the system controller.
pub const DEFAULT_SERVICE_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for a component service to register with the controller.
pub const DEFAULT_MAX_REGISTRATION_ATTEMPTS: u32 = 10;

/// Interval between registration attempts.
pub const DEFAULT_REGISTRATION_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Default heartbeat publication interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Default max concurrency for pull client handlers.
pub const DEFAULT_PULL_CLIENT_MAX_CONCURRENCY: usize = 64;

/// One record processor is spawned per this many workers (scale-with-workers).
pub const DEFAULT_RECORD_PROCESSOR_SCALE_FACTOR: usize = 4;

/// Hard cap on the auto-computed worker count.
pub const DEFAULT_MAX_WORKERS_CAP: usize = 32;

/// Interval between worker status checks in the worker manager.
pub const DEFAULT_WORKER_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Interval between worker status summary publications.
pub const DEFAULT_WORKER_STATUS_SUMMARY_INTERVAL: Duration = Duration::from_secs(5);

/// Seconds a worker stays in Error status after its failure count increases.
pub const DEFAULT_WORKER_ERROR_RECOVERY_TIME_SECS: f64 = 5.0;

/// CPU usage percentage above which a worker is considered under high load.
pub const DEFAULT_WORKER_HIGH_LOAD_CPU_USAGE: f64 = 90.0;

/// Seconds a worker stays in HighLoad status after a high-load reading.
pub const DEFAULT_WORKER_HIGH_LOAD_RECOVERY_TIME_SECS: f64 = 10.0;

/// Seconds without a health update before a worker is considered stale.
pub const DEFAULT_WORKER_STALE_TIME_SECS: f64 = 15.0;

/// Interval between worker health publications.
pub const DEFAULT_WORKER_HEALTH_INTERVAL: Duration = Duration::from_secs(2);

/// Interval between records processing stats publications.
pub const DEFAULT_PROGRESS_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Interval between realtime metric publications.
pub const DEFAULT_REALTIME_METRICS_INTERVAL: Duration = Duration::from_secs(1);

/// Interval between credit phase progress publications.
pub const DEFAULT_CREDIT_PHASE_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// How long the controller waits after publishing ProfileCancel before stopping.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Bounded wait for in-flight records after a cancel before force-completing.
pub const DEFAULT_CANCEL_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the controller waits after broadcasting Shutdown before tearing down.
pub const DEFAULT_SHUTDOWN_BROADCAST_GRACE: Duration = Duration::from_millis(500);

/// Interval between telemetry collection cycles.
pub const DEFAULT_TELEMETRY_COLLECTION_INTERVAL: Duration = Duration::from_secs(1);

/// Percent difference above which a usage diff metric counts as a discrepancy.
pub const USAGE_PCT_DIFF_THRESHOLD: f64 = 5.0;

/// Capacity of the event-bus broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 4096;

/// Subdirectory of the artifact directory holding log files.
pub const LOG_FOLDER: &str = "logs";

/// Name of the rolling log file.
pub const LOG_FILE: &str = "aiperf.log";

/// Name of the exported formatted-payload file.
pub const INPUTS_JSON_FILE: &str = "inputs.json";
