/*!
Logging and profiling setup for kmz-tools.

Logs go to stderr so that stdout only carries command output. The filter comes from
`RUST_LOG`, defaulting to `debug` in debug builds and `info` otherwise.

With the `profiling` feature, setting `KMZ_TOOLS_TRACE=<file>` also records a Chrome
trace of every `profiling` scope to that file. Open it in Perfetto or
`chrome://tracing`.
*/

use tracing_subscriber::EnvFilter;

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cfg!(debug_assertions) {
            "debug"
        } else {
            "info"
        })
    })
}

#[cfg(feature = "profiling")]
mod inner {
    use tracing_chrome::{ChromeLayerBuilder, FlushGuard};
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    /// Environment variable naming the Chrome trace output file
    pub const TRACE_ENV: &str = "KMZ_TOOLS_TRACE";

    /// Flushes the trace file when dropped
    pub struct LoggingGuard {
        _chrome: Option<FlushGuard>,
    }

    pub fn setup_logging_and_profiling() -> LoggingGuard {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(super::default_filter());

        let trace_file = std::env::var_os(TRACE_ENV);
        let (chrome_layer, guard) = match &trace_file {
            Some(path) => {
                let (layer, guard) = ChromeLayerBuilder::new()
                    .file(path)
                    .include_args(true)
                    .build();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(chrome_layer)
            .with(fmt_layer)
            .init();

        match trace_file {
            Some(path) => tracing::info!("Recording Chrome trace to {:?}", path),
            None => tracing::debug!("{} not set, profiling inactive", TRACE_ENV),
        }
        LoggingGuard { _chrome: guard }
    }
}

#[cfg(not(feature = "profiling"))]
mod inner {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    pub struct LoggingGuard;

    pub fn setup_logging_and_profiling() -> LoggingGuard {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(super::default_filter());
        tracing_subscriber::registry().with(fmt_layer).init();
        LoggingGuard
    }
}

pub use inner::{LoggingGuard, setup_logging_and_profiling};
