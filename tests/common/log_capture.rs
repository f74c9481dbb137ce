//! Captures tracing events emitted on the current thread.

use std::sync::{Arc, Mutex};

use tracing_subscriber::layer::SubscriberExt;

pub struct TestLogCapture {
    logs: Arc<Mutex<Vec<CapturedLog>>>,
    _guard: tracing::subscriber::DefaultGuard,
}

#[derive(Debug, Clone)]
pub struct CapturedLog {
    pub level: tracing::Level,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl TestLogCapture {
    /// Start capturing. Capture stops when the returned value is dropped.
    ///
    /// Only events on this thread are seen, so async tests using it must
    /// run on the current-thread runtime.
    pub fn start() -> Self {
        let logs = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(CaptureLayer {
            logs: Arc::clone(&logs),
        });
        let guard = tracing::subscriber::set_default(subscriber);
        Self {
            logs,
            _guard: guard,
        }
    }

    pub fn assert_logged_at_level(&self, level: tracing::Level, needle: &str) {
        let logs = self.logs.lock().unwrap();
        assert!(
            logs.iter()
                .any(|l| l.level == level && l.message.contains(needle)),
            "Expected {level} log containing '{needle}'. Logged: {:#?}",
            logs.iter().map(|l| (&l.level, &l.message)).collect::<Vec<_>>()
        );
    }

    /// Assert some event carried `field` with a value containing `value`.
    pub fn assert_field_logged(&self, field: &str, value: &str) {
        let logs = self.logs.lock().unwrap();
        assert!(
            logs.iter()
                .any(|l| l.fields.iter().any(|(k, v)| k == field && v.contains(value))),
            "Expected field {field}={value}. Logged fields: {:#?}",
            logs.iter().map(|l| &l.fields).collect::<Vec<_>>()
        );
    }

    pub fn logs(&self) -> Vec<CapturedLog> {
        self.logs.lock().unwrap().clone()
    }
}

struct CaptureLayer {
    logs: Arc<Mutex<Vec<CapturedLog>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.logs.lock().unwrap().push(CapturedLog {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push((field.name().to_string(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }
}
