use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with a console formatter.
///
/// `RUST_LOG` takes precedence; otherwise `level` (the `LOGGING_LEVEL` setting)
/// applies to the Clipsync crates and noisy dependencies are kept at `warn`.
pub fn init_tracing(level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level = normalize_level(level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,clipsync={level},clipsync_worker={level},clipsync_storage={level},clipsync_db={level},clipsync_core={level}"
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    tracing::info!(level, "Logging initialized");
    Ok(())
}

/// Map the accepted level names onto tracing levels; unknown names fall back to `info`.
fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        _ => "info",
    }
}
