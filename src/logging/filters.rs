use tracing_subscriber::EnvFilter;

use super::LoggingConfig;

/// Фильтр событий.
///
/// Если задан `RUST_LOG`, он главнее конфигурации. Иначе используется
/// директива из конфигурации, а при её ошибке `info`.
pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let directive = config.build_filter_directive();
    EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("Invalid log filter directive '{directive}': {e}; falling back to 'info'");
        EnvFilter::new("info")
    })
}

#[cfg(test)]
mod tests {
    use std::env;

    use serial_test::serial;
    use tracing_subscriber::{fmt, prelude::*, Registry};

    use super::*;
    use crate::logging::test_writer::BufferWriter;

    /// Тест проверяет, что директива из конфигурации отсекает события ниже
    /// заданного уровня.
    #[test]
    #[serial]
    fn test_config_directive_filters_levels() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            level: "warn".to_string(),
            ..Default::default()
        };

        let buffer = BufferWriter::default();
        let layer = fmt::layer()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .with_filter(build_filter_from_config(&cfg));
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("hidden info event");
            tracing::warn!("visible warn event");
        });

        let out = buffer.contents();
        assert!(out.contains("visible warn event"));
        assert!(!out.contains("hidden info event"));
    }

    /// Тест проверяет, что `RUST_LOG` главнее конфигурации.
    #[test]
    #[serial]
    fn test_rust_log_wins() {
        env::set_var("RUST_LOG", "trace");
        let cfg = LoggingConfig {
            level: "error".to_string(),
            ..Default::default()
        };
        let filter = build_filter_from_config(&cfg);
        env::remove_var("RUST_LOG");

        assert_eq!(
            filter.max_level_hint(),
            Some(tracing::level_filters::LevelFilter::TRACE)
        );
    }
}
