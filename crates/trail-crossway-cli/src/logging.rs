/*!
Logging and profiling setup for the command-line driver.

Logs always go to stderr so stdout carries nothing but the JSON result. With the
`profiling` feature compiled in and `ENABLE_PROFILING` set, a chrome trace is also
written to the system temp directory.
*/

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Keeps the profiling backend alive; the trace file is flushed when dropped
#[must_use]
pub struct LoggingGuard {
    #[cfg(feature = "profiling")]
    _chrome: Option<tracing_chrome::FlushGuard>,
}

fn set_default_filter(verbose: bool) {
    if std::env::var("RUST_LOG").is_err() {
        let default = if verbose {
            "debug"
        } else if cfg!(debug_assertions) {
            "info,trail_crossway_lib=debug"
        } else {
            "warn,trail_crossway_cli=info,trail_crossway_lib=info"
        };
        // Safety: single-threaded at startup
        unsafe {
            std::env::set_var("RUST_LOG", default);
        }
    }
}

/// Initialize logging with sensible defaults (`RUST_LOG` wins when set)
#[cfg(not(feature = "profiling"))]
pub fn setup_logging_and_profiling(verbose: bool) -> LoggingGuard {
    set_default_filter(verbose);

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(fmt_layer).init();

    tracing::debug!("Logging initialized (profiling disabled in this build)");
    LoggingGuard {}
}

/// Initialize logging, plus a chrome trace layer when `ENABLE_PROFILING` is set
#[cfg(feature = "profiling")]
pub fn setup_logging_and_profiling(verbose: bool) -> LoggingGuard {
    use tracing_chrome::ChromeLayerBuilder;

    set_default_filter(verbose);

    let (chrome_layer, chrome_guard) = if std::env::var("ENABLE_PROFILING").is_ok() {
        let trace_file = std::env::temp_dir().join(format!(
            "trail-crossway-trace-{}.json",
            std::process::id()
        ));
        let (layer, guard) = ChromeLayerBuilder::new()
            .file(&trace_file)
            .include_args(true)
            .build();
        eprintln!("Writing profiling trace to {}", trace_file.display());
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry()
        .with(chrome_layer)
        .with(fmt_layer)
        .init();

    tracing::debug!(
        profiling = chrome_guard.is_some(),
        "Logging initialized with chrome profiling layer"
    );
    LoggingGuard {
        _chrome: chrome_guard,
    }
}
