use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maps the configured level name onto a tracing level directive.
///
/// `verbose` and `silly` are accepted for compatibility with older settings
/// files and map to `debug` and `trace`.
pub fn level_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "info" => "info",
        "verbose" | "debug" => "debug",
        "silly" | "trace" => "trace",
        _ => "info",
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str) -> Result<()> {
    let directive = level_directive(level);
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "issue_tracker={directive},tower_http={directive}"
        ))
    })?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::level_directive;

    #[test]
    fn legacy_level_names_are_mapped() {
        assert_eq!(level_directive("verbose"), "debug");
        assert_eq!(level_directive("silly"), "trace");
        assert_eq!(level_directive("WARN"), "warn");
        assert_eq!(level_directive("nonsense"), "info");
    }
}
