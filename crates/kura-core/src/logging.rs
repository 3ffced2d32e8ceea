//! Logging utilities with Kura segment prefixes.
//!
//! Library code only emits `tracing` events. Native hosts install a subscriber
//! with [`init`]; browser hosts bring their own.

#[cfg(not(target_arch = "wasm32"))]
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with Kura defaults.
///
/// Sets up tracing-subscriber with:
/// - Environment filter (RUST_LOG)
/// - Compact format suitable for terminal output
///
/// Does nothing if a global subscriber is already installed.
#[cfg(not(target_arch = "wasm32"))]
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing with a custom default filter.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_with_filter(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

/// Segment prefixes for logging.
pub mod prefix {
    /// Database operations prefix
    pub const DB: &str = "⊔";
    /// Connection open prefix
    pub const OPEN: &str = "✿";
    /// Connection close prefix
    pub const CLOSE: &str = "❀";
}
