//! Structured logging helpers.
//!
//! Every correlation log line carries a `component` field and, where one
//! exists, the `correlation_key`, so a single request can be followed from
//! dispatch to match (or timeout) across threads.

/// Log an event with a component field.
#[macro_export]
macro_rules! log_event {
    ($level:ident, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a correlation-related event with standard fields.
#[macro_export]
macro_rules! log_correlation_event {
    ($level:ident, $component:expr, $msg:expr, $key:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            component = $component,
            correlation_key = %$key,
            $($($field)*,)?
            $msg
        )
    };
}
