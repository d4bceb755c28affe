//! `tracing-subscriber` integration.
//!
//! [`DedupLayerFilter`] is a per-layer filter: attach it to any layer with
//! `Layer::with_filter` and that layer only sees events the
//! [`DeduplicationFilter`] lets through.
//!
//! ```no_run
//! use std::sync::Arc;
//! use logdedup::{DedupLayerFilter, DeduplicationFilter, DeduplicationSettings};
//! use tracing_subscriber::prelude::*;
//!
//! let filter = Arc::new(DeduplicationFilter::new(DeduplicationSettings::default()).unwrap());
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer().with_filter(DedupLayerFilter::new(filter)))
//!     .init();
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Metadata};
use tracing_subscriber::layer::{Context, Filter};

use crate::event::{LogEvent, PropertyValue, ScalarValue};
use crate::filter::DeduplicationFilter;
use crate::severity::Severity;

const MESSAGE_FIELD: &str = "message";

/// Adapts a [`DeduplicationFilter`] to the `tracing-subscriber` filter API.
#[derive(Clone)]
pub struct DedupLayerFilter {
    inner: Arc<DeduplicationFilter>,
}

impl DedupLayerFilter {
    /// Wraps a shared filter.
    pub fn new(inner: Arc<DeduplicationFilter>) -> Self {
        Self { inner }
    }

    /// The wrapped filter.
    pub fn inner(&self) -> &Arc<DeduplicationFilter> {
        &self.inner
    }
}

impl fmt::Debug for DedupLayerFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupLayerFilter")
            .field("cache", self.inner.cache())
            .finish()
    }
}

impl<S> Filter<S> for DedupLayerFilter {
    fn enabled(&self, _meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        // Spans always pass; events are decided individually in `event_enabled`.
        true
    }

    fn event_enabled(&self, event: &Event<'_>, _cx: &Context<'_, S>) -> bool {
        self.inner.decide(&to_log_event(event))
    }
}

/// Converts a `tracing` event into the filter's event model.
///
/// The recorded `message` field becomes the message template; every other
/// field becomes a scalar property.
pub fn to_log_event(event: &Event<'_>) -> LogEvent {
    let mut visitor = EventVisitor {
        event: LogEvent::new(Severity::from(*event.metadata().level()), String::new()),
    };
    event.record(&mut visitor);
    visitor.event
}

struct EventVisitor {
    event: LogEvent,
}

impl EventVisitor {
    fn record_scalar(&mut self, field: &Field, value: ScalarValue) {
        if field.name() == MESSAGE_FIELD {
            self.event.message_template = value.to_string();
        } else {
            self.event
                .properties
                .insert(field.name().to_string(), PropertyValue::Scalar(value));
        }
    }
}

impl Visit for EventVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_scalar(field, ScalarValue::F64(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_scalar(field, ScalarValue::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_scalar(field, ScalarValue::U64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_scalar(field, ScalarValue::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_scalar(field, ScalarValue::Str(value.to_string()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record_scalar(field, ScalarValue::Str(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_scalar(field, ScalarValue::Str(format!("{:?}", value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DeduplicationSettings;
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Layer;

    /// Records what reaches it, so tests can see what the filter let through.
    #[derive(Clone, Default)]
    struct Captured {
        events: Arc<Mutex<Vec<LogEvent>>>,
    }

    impl<S: tracing::Subscriber> Layer<S> for Captured {
        fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            self.events.lock().unwrap().push(to_log_event(event));
        }
    }

    fn capture(settings: DeduplicationSettings, emit: impl FnOnce()) -> Vec<LogEvent> {
        let filter = Arc::new(DeduplicationFilter::new(settings).unwrap());
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry()
            .with(captured.clone().with_filter(DedupLayerFilter::new(filter)));
        tracing::subscriber::with_default(subscriber, emit);
        let events = captured.events.lock().unwrap().clone();
        events
    }

    #[test]
    fn test_conversion_fields_and_message() {
        let events = capture(DeduplicationSettings::default(), || {
            tracing::warn!(code = "E42", attempt = 3u64, ok = false, "Retry failed");
        });
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.message_template, "Retry failed");
        assert_eq!(event.property("code"), Some(&PropertyValue::from("E42")));
        assert_eq!(event.property("attempt"), Some(&PropertyValue::from(3u64)));
        assert_eq!(event.property("ok"), Some(&PropertyValue::from(false)));
    }

    #[test]
    fn test_display_field_recorded_unquoted() {
        let events = capture(DeduplicationSettings::default(), || {
            let device = "sda";
            tracing::error!(device = %device, "Disk full");
        });
        assert_eq!(events[0].property("device"), Some(&PropertyValue::from("sda")));
    }

    #[test]
    fn test_duplicates_suppressed_through_subscriber() {
        let events = capture(DeduplicationSettings::default(), || {
            for _ in 0..3 {
                tracing::info!("Connection refused");
            }
            tracing::info!("Connection restored");
        });
        let messages: Vec<_> = events.iter().map(|e| e.message_template.as_str()).collect();
        assert_eq!(messages, vec!["Connection refused", "Connection restored"]);
    }

    #[test]
    fn test_key_properties_from_fields() {
        let settings = DeduplicationSettings {
            key_properties: vec!["device".to_string()],
            ..Default::default()
        };
        let events = capture(settings, || {
            tracing::error!(device = "sda", "Disk full");
            tracing::error!(device = "sdb", "Disk full");
            tracing::error!(device = "sda", "Disk full");
        });
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_trace_maps_to_verbose_policy() {
        let settings = DeduplicationSettings {
            verbose: crate::settings::DeduplicationLevel::disabled(),
            ..Default::default()
        };
        let events = capture(settings, || {
            tracing::trace!("tick");
            tracing::trace!("tick");
        });
        assert_eq!(events.len(), 2);
    }
}
