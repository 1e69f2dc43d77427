//! Log output for the binaries
//!
//! The library itself only emits `tracing` events. Binaries call [`init`]
//! once at startup; `RUST_LOG` overrides the level passed in.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{LinkError, LinkResult};

/// Install a formatted subscriber filtered at `level`.
pub fn init(level: &str) -> LinkResult<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| LinkError::configuration(format!("Logging already initialized: {}", e)))
}
