//! OS-specific primitives: pipes, non-blocking descriptors, mirrored mappings.

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::*;

#[cfg(not(unix))]
compile_error!("app-warden requires a unix target (mirrored mappings and pipes are implemented with libc)");
