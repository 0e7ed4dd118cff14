use kmz_track_lib::{Notice, NoticeLevel, Reporter};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Forwards notices to the log and counts errors
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    errors: AtomicUsize,
}

impl ConsoleReporter {
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

impl Reporter for ConsoleReporter {
    fn on_progress(&self, percent: u8) {
        tracing::trace!("Progress: {}%", percent);
    }

    fn on_notice(&self, notice: &Notice) {
        let file = notice.file.as_deref().unwrap_or("-");
        match notice.level {
            NoticeLevel::Success => tracing::info!(file = file, "{}", notice.message),
            NoticeLevel::Warning => tracing::warn!(file = file, "{}", notice.message),
            NoticeLevel::Error => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(file = file, "{}", notice.message);
            }
        }
    }
}
