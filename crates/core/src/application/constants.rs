// Engine and scheduler constants (no magic values)
use std::time::Duration;

/// Interval between readiness probes of an output file (1s)
pub const FILE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Interval between dispatch loop passes over the binding table (1s)
pub const DISPATCH_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default size of the thread-backed pool
pub const DEFAULT_MAX_THREADS: usize = 10;

/// Default size of the process-backed pool
pub const DEFAULT_MAX_PROCESSES: usize = 5;

/// Default bound on concurrent runs of one binding
pub const DEFAULT_MAX_INSTANCES: usize = 3;

/// Default lateness after which a fire is dropped instead of run (60s)
pub const DEFAULT_MISFIRE_GRACE: Duration = Duration::from_secs(60);

/// Slack applied to fresh-output checks for coarse filesystem mtimes (1s)
pub const FRESHNESS_TOLERANCE: Duration = Duration::from_secs(1);
