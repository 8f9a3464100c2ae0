pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_PROGRAM: &str = "OpenSees";
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_ACCEPTED_EXTENSIONS: [&str; 2] = [".tcl", ".txt"];

pub const SCRATCH_DIR_NAME: &str = "opensees-gateway";
pub const ARTIFACT_SUFFIX: &str = "tcl";

pub const PROBE_TIMEOUT_SECS: u64 = 5;
pub const KILL_GRACE_MS: u64 = 500;
