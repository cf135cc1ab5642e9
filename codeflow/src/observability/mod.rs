//! Observability utilities.
//!
//! Structured logging goes through `tracing`; [`init_tracing`] installs a
//! subscriber. Event payloads for [`EventSink`](crate::events::EventSink)
//! consumers are built in [`wide_events`].

mod logging;
pub mod wide_events;

pub use logging::{init_tracing, LogFormat, DEFAULT_FILTER};
