/// Native module runs the external program directly on the host,
/// without containers or sandboxes.
pub mod artifact;
pub mod runner;
