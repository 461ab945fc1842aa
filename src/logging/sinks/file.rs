use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::Layer, registry::LookupSpan};

use crate::logging::{formatter, LoggingConfig, LoggingError};

/// Слой записи в файл с ежедневной ротацией.
///
/// Файлы называются `<file_name>.<YYYY-MM-DD>` в каталоге `log_dir`.
/// Возвращённый guard должен жить, пока нужен файловый лог.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> Result<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard), LoggingError>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(&config.log_dir)?;
    let appender = rolling::daily(&config.log_dir, &config.file_name);
    let (writer, guard) = non_blocking(appender);
    Ok((formatter::build_formatter(config, writer, false), guard))
}
