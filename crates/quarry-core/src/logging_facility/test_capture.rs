//! In-memory event capture for logging assertions in tests

use crate::core_types::schema::{
    FIELD_ERR_CODE, FIELD_ERR_KIND, FIELD_EVENT, FIELD_MODEL, FIELD_OP, FIELD_ROW_COUNT,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// One recorded event; every field is kept in its display form
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    pub op: Option<String>,
    pub event: Option<String>,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn model(&self) -> Option<&str> {
        self.field(FIELD_MODEL)
    }

    pub fn row_count(&self) -> Option<u64> {
        self.field(FIELD_ROW_COUNT).and_then(|n| n.parse().ok())
    }

    pub fn err_code(&self) -> Option<&str> {
        self.field(FIELD_ERR_CODE)
    }

    pub fn err_kind(&self) -> Option<&str> {
        self.field(FIELD_ERR_KIND)
    }

    fn is(&self, op: &str, event: &str) -> bool {
        self.op.as_deref() == Some(op) && self.event.as_deref() == Some(event)
    }
}

#[derive(Default)]
struct Fields(HashMap<String, String>);

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        let fields = fields.0;
        let captured = CapturedEvent {
            level: *event.metadata().level(),
            op: fields.get(FIELD_OP).cloned(),
            event: fields.get(FIELD_EVENT).cloned(),
            fields,
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(captured);
        }
    }
}

/// Shared handle onto the captured events
#[derive(Clone)]
pub struct TestCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl TestCapture {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events of one operation, in emission order
    pub fn events_for_op(&self, op: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.op.as_deref() == Some(op))
            .collect()
    }

    /// Boundary events of `op` for one model; tests sharing the buffer
    /// stay apart by using distinct model names
    pub fn boundaries(&self, op: &str, event: &str, model: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.is(op, event) && e.model() == Some(model))
            .collect()
    }

    /// # Panics
    ///
    /// Panics when no `op`/`event` pair was recorded
    pub fn assert_event_exists(&self, op: &str, event: &str) {
        let events = self.events();
        assert!(
            events.iter().any(|e| e.is(op, event)),
            "Expected event op={} event={} not found in {} captured events",
            op,
            event,
            events.len()
        );
    }
}

static GLOBAL_CAPTURE: OnceLock<TestCapture> = OnceLock::new();

/// Install the capture layer as the global subscriber on first use
///
/// Every test in a binary shares one buffer, so filter on an operation or
/// model name unique to the test.
///
/// ```
/// use quarry_core::logging_facility::test_capture::init_test_capture;
/// use quarry_core::log_op_start;
///
/// let capture = init_test_capture();
/// log_op_start!("doc_capture_op", model = "Gadget");
/// assert_eq!(capture.boundaries("doc_capture_op", "start", "Gadget").len(), 1);
/// ```
pub fn init_test_capture() -> TestCapture {
    GLOBAL_CAPTURE
        .get_or_init(|| {
            let capture = TestCapture {
                events: Arc::new(Mutex::new(Vec::new())),
            };
            let layer = CaptureLayer {
                events: capture.events.clone(),
            };
            tracing_subscriber::registry().with(layer).init();
            capture
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors_read_canonical_fields() {
        let fields = HashMap::from([
            (FIELD_MODEL.to_string(), "Post".to_string()),
            (FIELD_ROW_COUNT.to_string(), "4".to_string()),
            (FIELD_ERR_CODE.to_string(), "ERR_NOT_FOUND".to_string()),
        ]);
        let event = CapturedEvent {
            level: Level::INFO,
            op: Some("find".to_string()),
            event: Some("end".to_string()),
            fields,
        };
        assert_eq!(event.model(), Some("Post"));
        assert_eq!(event.row_count(), Some(4));
        assert_eq!(event.err_code(), Some("ERR_NOT_FOUND"));
        assert!(event.is("find", "end"));
        assert!(!event.is("find", "start"));
    }
}
