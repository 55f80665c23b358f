use std::cell::RefCell;
use std::sync::Once;

use soltix_wallet_core::telemetry::parse_level;
use tracing::{Level, Span};
use wasm_bindgen::prelude::*;

static INIT: Once = Once::new();

thread_local! {
    static COMPONENT_GUARD: RefCell<Option<tracing::span::Entered<'static>>> = RefCell::new(None);
}

#[wasm_bindgen(js_name = initTracing)]
pub fn init_tracing(level: String) {
    init(parse_level(&level));
}

fn install(level: Level) {
    console_error_panic_hook::set_once();

    let mut builder = tracing_wasm::WASMLayerConfigBuilder::new();
    builder
        .set_max_level(level)
        .set_console_config(tracing_wasm::ConsoleConfig::ReportWithConsoleColor)
        .set_report_logs_in_timings(true);
    tracing_wasm::set_as_global_default_with_config(builder.build());
}

pub fn init(level: Level) {
    INIT.call_once(|| {
        install(level);
        tracing::info!("Tracing initialized at level = {}", level);
    });
}

// Same as `init`, plus a permanently entered `component` span.
pub fn init_with_component(level: Level, component: &str) {
    INIT.call_once(|| {
        install(level);

        let span: &'static Span =
            Box::leak(Box::new(tracing::info_span!("component", crate = component)));
        COMPONENT_GUARD.with(|cell| {
            *cell.borrow_mut() = Some(span.enter());
        });

        tracing::info!(
            "Tracing initialized at level = {} (component={})",
            level,
            component
        );
    });
}
