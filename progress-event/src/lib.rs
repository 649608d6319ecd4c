//! Workflow progress event protocol: type + payload + envelope.
//!
//! This crate defines the wire shape of a single progress event and envelope injection.
//! It does not depend on loom. Loom emits [`ProgressEvent`] values during workflow
//! execution and wraps them with [`Envelope`] before handing them to subscribers.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState, ProgressEnvelope};
pub use event::ProgressEvent;
