//! Observability setup for Switchyard: structured logging and optional
//! OpenTelemetry span export.

pub mod tracing_setup;
