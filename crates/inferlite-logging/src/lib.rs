use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::subscriber::DefaultGuard;
use tracing::Subscriber;
use tracing_log::LogTracer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

/// Environment variable consulted when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "INFERLITE_LOG";

#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub ts: String,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<JsonValue>,
}

/// Span enter (`"B"`) or exit (`"E"`) with a microsecond timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct SpanEvent {
    pub name: String,
    pub target: String,
    pub ph: String,
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<JsonValue>,
}

type LogHook = Arc<dyn Fn(&LogRecord) + Send + Sync>;
type SpanHook = Arc<dyn Fn(&SpanEvent) + Send + Sync>;

static LOG_HOOK: OnceCell<LogHook> = OnceCell::new();
static SPAN_HOOK: OnceCell<SpanHook> = OnceCell::new();

pub struct LoggingGuard {
    _guard: Option<DefaultGuard>,
}

#[derive(Clone, Default)]
pub struct LoggingOptions {
    /// Human readable output on stderr.
    pub enable_fmt: bool,
    /// Forward span enter/exit to the span hook.
    pub enable_spans: bool,
}

/// First hook wins; later calls are ignored.
pub fn set_log_hook<F>(hook: F)
where
    F: Fn(&LogRecord) + Send + Sync + 'static,
{
    let _ = LOG_HOOK.set(Arc::new(hook));
}

pub fn set_span_hook<F>(hook: F)
where
    F: Fn(&SpanEvent) + Send + Sync + 'static,
{
    let _ = SPAN_HOOK.set(Arc::new(hook));
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env(LOG_ENV))
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the process subscriber. If one is already installed globally the
/// returned guard scopes a thread-local subscriber instead.
pub fn init_logging(opts: LoggingOptions) -> LoggingGuard {
    let _ = LogTracer::init();

    let build_subscriber = || {
        let fmt_layer = opts.enable_fmt.then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
        });
        let span_layer = opts.enable_spans.then_some(SpanBridgeLayer);
        tracing_subscriber::registry()
            .with(env_filter())
            .with(LogBridgeLayer)
            .with(span_layer)
            .with(fmt_layer)
    };

    let guard = match tracing::subscriber::set_global_default(build_subscriber()) {
        Ok(()) => None,
        Err(_) => Some(tracing::subscriber::set_default(build_subscriber())),
    };

    LoggingGuard { _guard: guard }
}

struct LogBridgeLayer;

#[derive(Clone, Copy)]
struct SpanBridgeLayer;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn now_timestamp_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

impl<S> Layer<S> for LogBridgeLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: tracing_subscriber::layer::Context<'_, S>) {
        let Some(hook) = LOG_HOOK.get() else {
            return;
        };
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord {
            ts: now_rfc3339(),
            level: event.metadata().level().to_string(),
            target: event.metadata().target().to_string(),
            message: visitor
                .message
                .unwrap_or_else(|| event.metadata().name().to_string()),
            span: ctx.event_span(event).map(|s| s.name().to_string()),
            fields: visitor.fields.filter(|v| {
                v.as_object().map(|m| !m.is_empty()).unwrap_or(false)
            }),
        };
        hook(&record);
    }
}

/// Fields recorded when a span is created, kept for its enter/exit events.
struct SpanFields(Option<JsonValue>);

impl<S> Layer<S> for SpanBridgeLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(visitor.fields));
        }
    }

    fn on_enter(&self, id: &tracing::span::Id, ctx: tracing_subscriber::layer::Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            emit_span_event(span, "B");
        }
    }

    fn on_exit(&self, id: &tracing::span::Id, ctx: tracing_subscriber::layer::Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            emit_span_event(span, "E");
        }
    }
}

fn emit_span_event<S>(span: tracing_subscriber::registry::SpanRef<'_, S>, phase: &str)
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let Some(hook) = SPAN_HOOK.get() else {
        return;
    };
    let meta = span.metadata();
    let fields = span
        .extensions()
        .get::<SpanFields>()
        .and_then(|f| f.0.clone());
    let ev = SpanEvent {
        name: meta.name().to_string(),
        target: meta.target().to_string(),
        ph: phase.to_string(),
        ts: now_timestamp_micros(),
        fields,
    };
    hook(&ev);
}

#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    fields: Option<JsonValue>,
}

impl JsonVisitor {
    fn insert(&mut self, name: &str, value: JsonValue) {
        let obj = self
            .fields
            .get_or_insert_with(|| JsonValue::Object(Default::default()));
        if let JsonValue::Object(map) = obj {
            map.insert(name.to_string(), value);
        }
    }
}

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let text = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.insert(field.name(), JsonValue::String(text));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field.name(), JsonValue::String(value.to_string()));
        }
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.insert(field.name(), JsonValue::from(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.insert(field.name(), JsonValue::from(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.insert(field.name(), JsonValue::Bool(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visitor_collects_named_fields() {
        let mut visitor = JsonVisitor::default();
        visitor.insert("program", JsonValue::String("mul_half".into()));
        visitor.insert("tile", JsonValue::from(8u64));
        let fields = visitor.fields.expect("fields");
        assert_eq!(fields["program"], "mul_half");
        assert_eq!(fields["tile"], 8);
        assert!(visitor.message.is_none());
    }

    #[test]
    fn log_records_serialize_without_empty_options() {
        let rec = LogRecord {
            ts: now_rfc3339(),
            level: "INFO".into(),
            target: "inferlite".into(),
            message: "ready".into(),
            span: None,
            fields: None,
        };
        let json = serde_json::to_value(&rec).expect("json");
        assert!(json.get("span").is_none());
        assert!(json.get("fields").is_none());
        assert!(json["ts"].as_str().is_some_and(|ts| ts.ends_with('Z')));
    }
}
