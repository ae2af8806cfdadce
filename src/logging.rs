//! Log routing for an execution
//!
//! Library code logs under `frost::*` targets. An execution can hand in its
//! own [`log::Log`] sink; otherwise records go to the global `log` facade.

use log::{Level, Log, Record};
use std::fmt;
use std::sync::Arc;

pub const ENGINE: &str = "frost::engine";
pub const RESOLVER: &str = "frost::resolver";
pub const RULESET: &str = "frost::ruleset";
pub const SCRIPT: &str = "frost::script";
pub const FETCH: &str = "frost::fetch";

/// Per-execution log router
#[derive(Clone, Default)]
pub struct Logger {
    sink: Option<Arc<dyn Log>>,
    silent: bool,
}

impl Logger {
    pub fn new(sink: Option<Arc<dyn Log>>, silent: bool) -> Self {
        Self { sink, silent }
    }

    /// A logger that drops everything
    pub fn silent() -> Self {
        Self {
            sink: None,
            silent: true,
        }
    }

    pub fn log(&self, level: Level, target: &str, args: fmt::Arguments<'_>) {
        if self.silent {
            return;
        }
        let record = Record::builder()
            .args(args)
            .level(level)
            .target(target)
            .module_path_static(Some(module_path!()))
            .build();
        match &self.sink {
            Some(sink) => {
                if sink.enabled(record.metadata()) {
                    sink.log(&record);
                }
            }
            None => {
                if level <= log::max_level() {
                    log::logger().log(&record);
                }
            }
        }
    }

    pub fn debug(&self, target: &str, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, target, args);
    }

    pub fn info(&self, target: &str, args: fmt::Arguments<'_>) {
        self.log(Level::Info, target, args);
    }

    pub fn warn(&self, target: &str, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, target, args);
    }

    pub fn error(&self, target: &str, args: fmt::Arguments<'_>) {
        self.log(Level::Error, target, args);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("custom_sink", &self.sink.is_some())
            .field("silent", &self.silent)
            .finish()
    }
}

/// Initialise `env_logger` with a default filter, honoring `RUST_LOG`
pub fn init(default_level: &str) -> Result<(), log::SetLoggerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .try_init()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Sink that keeps every record for inspection
    #[derive(Default)]
    pub(crate) struct CaptureSink {
        pub records: Mutex<Vec<(Level, String, String)>>,
    }

    impl Log for CaptureSink {
        fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &Record<'_>) {
            self.records.lock().push((
                record.level(),
                record.target().to_string(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }

    #[test]
    fn test_logger_forwards_to_sink() {
        let sink = Arc::new(CaptureSink::default());
        let logger = Logger::new(Some(sink.clone()), false);
        logger.warn(RESOLVER, format_args!("missing target {}", "#/a"));

        let records = sink.records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, Level::Warn);
        assert_eq!(records[0].1, RESOLVER);
        assert_eq!(records[0].2, "missing target #/a");
    }

    #[test]
    fn test_silenced_logger_drops_records() {
        let sink = Arc::new(CaptureSink::default());
        let logger = Logger::new(Some(sink.clone()), true);
        logger.error(ENGINE, format_args!("boom"));
        assert!(sink.records.lock().is_empty());
    }

    #[test]
    fn test_init_twice_is_an_error_not_a_panic() {
        let _ = init("warn");
        assert!(init("warn").is_err());
    }
}
