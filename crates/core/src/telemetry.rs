use tracing::Level;

#[cfg(not(target_arch = "wasm32"))]
use std::sync::Once;

#[cfg(not(target_arch = "wasm32"))]
static INIT: Once = Once::new();

/// Install the native `fmt` subscriber once. `RUST_LOG` overrides `level`.
#[cfg(not(target_arch = "wasm32"))]
pub fn init(level: Level) {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();

        tracing::info!("Tracing initialized at level = {}", level);
    });
}

// Same as `init`, but every event carries a `component` span.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_with_component(level: Level, component: &str) {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();

        // Leaked once per process so the entered guard can be 'static.
        let span: &'static tracing::Span =
            Box::leak(Box::new(tracing::info_span!("component", crate = component)));
        std::mem::forget(span.enter());

        tracing::info!(
            "Tracing initialized at level = {} (component={})",
            level,
            component
        );
    });
}

pub fn parse_level(s: &str) -> Level {
    match s.to_ascii_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}
