use tracing_appender::non_blocking::WorkerGuard;

/// Хэндл инициализированного логирования.
///
/// Держит guard неблокирующего файлового writer-а: пока хэндл жив, фоновый
/// поток дописывает буфер в файл. `shutdown()` сбрасывает буфер явно.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self { file_guard }
    }

    /// Пишется ли лог в файл.
    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Сбрасывает буферы и завершает фоновый writer.
    pub fn shutdown(mut self) {
        tracing::info!(file_sink = self.has_file_sink(), "Logging shutdown");
        drop(self.file_guard.take());
    }
}
