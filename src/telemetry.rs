use crate::config::AppConfig;
use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Adapter events at debug; other crates only when they warn.
const DEFAULT_TRACE_FILTER: &str = "idlbridge=debug,warn";

pub(crate) fn tracing_log_path() -> PathBuf {
    env::var("IDLBRIDGE_TRACE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("idlbridge_trace.jsonl"))
}

/// `IDLBRIDGE_TRACE_FILTER` directives, or the default when unset or invalid.
fn trace_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_TRACE_FILTER))
}

fn trace_subscriber<W>(writer: W, filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(writer)
        .with_current_span(false)
        .with_span_list(false)
        .finish()
}

/// Install a JSON tracing subscriber that writes adapter events to a file.
pub fn init_tracing(config: &AppConfig) {
    if !config.logging_enabled() {
        return;
    }

    let _ = TRACING_INIT.get_or_init(|| {
        let path = tracing_log_path();
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(_) => return,
        };
        let directives = env::var("IDLBRIDGE_TRACE_FILTER").ok();
        let subscriber = trace_subscriber(file, trace_filter(directives.as_deref()));
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    fn capture(filter: EnvFilter) -> String {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = trace_subscriber(move || writer.clone(), filter);
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "idlbridge::adapter", "unit executed");
            tracing::debug!(target: "vte::parser", "noisy dependency");
            tracing::warn!(target: "vte::parser", "dependency warning");
        });
        buf.contents()
    }

    #[test]
    fn default_filter_keeps_adapter_debug_and_dependency_warnings() {
        let output = capture(trace_filter(None));
        assert!(output.contains("unit executed"));
        assert!(output.contains("dependency warning"));
        assert!(!output.contains("noisy dependency"));
        let first: serde_json::Value =
            serde_json::from_str(output.lines().next().expect("one event")).expect("json line");
        assert_eq!(first["target"], "idlbridge::adapter");
    }

    #[test]
    fn filter_directives_override_the_default() {
        let output = capture(trace_filter(Some("idlbridge=info")));
        assert!(output.is_empty(), "output: {output}");
    }

    #[test]
    fn invalid_directives_fall_back_to_the_default() {
        let output = capture(trace_filter(Some("idlbridge=loud")));
        assert!(output.contains("unit executed"));
    }
}
