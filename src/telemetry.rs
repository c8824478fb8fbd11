use anyhow::{Context, Result};
use opentelemetry::KeyValue;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, WithExportConfig};
use opentelemetry_sdk::logs::LoggerProvider;
use opentelemetry_sdk::{runtime, Resource};
use tokio::signal;
use tracing::info;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";

pub const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const SERVICE_NAME: &str = "ventilation-controller";
pub const SERVICE_NAMESPACE: &str = "homeassistant";

/// Keeps the OTLP log pipeline alive; call [`TelemetryGuard::shutdown`] before exit
/// so batched records are flushed.
#[derive(Default)]
pub struct TelemetryGuard {
    provider: Option<LoggerProvider>,
}

impl TelemetryGuard {
    pub fn exporting(&self) -> bool {
        self.provider.is_some()
    }

    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "failed to flush OTLP logs");
            }
        }
    }
}

/// Install the global subscriber.
///
/// JSON lines on stdout by default; `VENT_LOG_FORMAT=pretty` switches to the
/// human-readable formatter. `RUST_LOG` overrides the filter. When
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set, every event is also exported as an
/// OTLP log record.
pub fn init_tracing() -> Result<TelemetryGuard> {
    let provider = otlp_endpoint(std::env::var(OTLP_ENDPOINT_VAR).ok())
        .map(|endpoint| log_provider(&endpoint))
        .transpose()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let bridge = provider
        .as_ref()
        .map(|p| OpenTelemetryTracingBridge::new(p).with_filter(exporter_targets()));
    let registry = tracing_subscriber::registry().with(filter).with(bridge);

    let pretty = std::env::var("VENT_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("pretty"));
    if pretty {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    }

    if provider.is_some() {
        info!(service = SERVICE_NAME, "exporting logs over OTLP");
    }
    Ok(TelemetryGuard { provider })
}

/// Blank values count as unset.
fn otlp_endpoint(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn resource() -> Resource {
    Resource::new([
        KeyValue::new("service.name", SERVICE_NAME),
        KeyValue::new("service.namespace", SERVICE_NAMESPACE),
    ])
}

fn log_provider(endpoint: &str) -> Result<LoggerProvider> {
    let exporter = LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .with_context(|| format!("building OTLP log exporter for {endpoint}"))?;

    Ok(LoggerProvider::builder()
        .with_resource(resource())
        .with_batch_exporter(exporter, runtime::Tokio)
        .build())
}

/// The exporter's own transport must not feed back into it.
fn exporter_targets() -> Targets {
    Targets::new()
        .with_default(LevelFilter::TRACE)
        .with_target("opentelemetry", LevelFilter::OFF)
        .with_target("opentelemetry_sdk", LevelFilter::OFF)
        .with_target("opentelemetry_otlp", LevelFilter::OFF)
        .with_target("tonic", LevelFilter::OFF)
        .with_target("h2", LevelFilter::OFF)
        .with_target("hyper", LevelFilter::OFF)
        .with_target("tower", LevelFilter::OFF)
}

/// Resolves on Ctrl+C, or SIGTERM on unix, whichever comes first.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! { _ = ctrl_c => {}, _ = terminate => {}, }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::{Key, Value};

    #[test]
    fn test_otlp_endpoint_only_when_set() {
        assert_eq!(otlp_endpoint(None), None);
        assert_eq!(otlp_endpoint(Some(String::new())), None);
        assert_eq!(otlp_endpoint(Some("   ".into())), None);
        assert_eq!(
            otlp_endpoint(Some(" http://collector:4317 ".into())),
            Some("http://collector:4317".to_string())
        );
    }

    #[test]
    fn test_resource_identifies_service() {
        let resource = resource();
        assert_eq!(
            resource.get(Key::from_static_str("service.name")),
            Some(Value::from(SERVICE_NAME))
        );
        assert_eq!(
            resource.get(Key::from_static_str("service.namespace")),
            Some(Value::from(SERVICE_NAMESPACE))
        );
    }

    #[test]
    fn test_exporter_targets_drop_transport_events() {
        let targets = exporter_targets();
        assert!(targets.would_enable("ventilation_controller::controller", &tracing::Level::INFO));
        assert!(!targets.would_enable("tonic::transport", &tracing::Level::ERROR));
        assert!(!targets.would_enable("opentelemetry_sdk::logs", &tracing::Level::WARN));
    }

    // shutdown blocks on the batch worker, which needs a second thread
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_log_provider_builds_and_shuts_down() {
        let provider = log_provider("http://127.0.0.1:4317").unwrap();
        let guard = TelemetryGuard {
            provider: Some(provider),
        };
        assert!(guard.exporting());
        guard.shutdown();
    }

    #[test]
    fn test_default_guard_is_noop() {
        let guard = TelemetryGuard::default();
        assert!(!guard.exporting());
        guard.shutdown();
    }
}
