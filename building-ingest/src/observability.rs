use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "building_ingest=info,building_client=info";

/// `RUST_LOG` when it is set and non-blank, otherwise the crate defaults.
fn filter_directives(rust_log: Option<String>) -> String {
    rust_log
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string())
}

fn env_filter(rust_log: Option<String>) -> EnvFilter {
    EnvFilter::try_new(filter_directives(rust_log)).unwrap_or_else(|e| {
        eprintln!("ignoring invalid {}: {e}", EnvFilter::DEFAULT_ENV);
        EnvFilter::new(DEFAULT_DIRECTIVES)
    })
}

pub fn init_tracing() {
    let filter = env_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn defaults_apply_only_without_rust_log() {
        assert_eq!(filter_directives(None), DEFAULT_DIRECTIVES);
        assert_eq!(filter_directives(Some("  ".to_string())), DEFAULT_DIRECTIVES);
        assert_eq!(filter_directives(Some("warn".to_string())), "warn");
    }

    #[test]
    fn rust_log_can_raise_and_lower_crate_levels() {
        let debug = env_filter(Some("building_ingest=debug".to_string()));
        assert_eq!(debug.max_level_hint(), Some(LevelFilter::DEBUG));

        let quiet = env_filter(Some("error".to_string()));
        assert_eq!(quiet.max_level_hint(), Some(LevelFilter::ERROR));

        assert_eq!(env_filter(None).max_level_hint(), Some(LevelFilter::INFO));
    }
}
