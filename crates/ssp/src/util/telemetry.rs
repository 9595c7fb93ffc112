use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// Initialize tracing
///
/// Filtering follows `RUST_LOG` and falls back to `info`.
pub fn init(json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    if json {
        let logger = tracing_subscriber::fmt::layer().json();
        let collector = Registry::default().with(logger).with(env_filter);
        tracing::subscriber::set_global_default(collector)?;
    } else {
        let logger = tracing_subscriber::fmt::layer().compact();
        let collector = Registry::default().with(logger).with(env_filter);
        tracing::subscriber::set_global_default(collector)?;
    }

    Ok(())
}
