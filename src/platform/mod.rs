//! Platform-specific process plumbing

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::*;

#[cfg(not(unix))]
compile_error!("trigger-launcher relies on Unix process groups and signals");
