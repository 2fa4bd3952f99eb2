//! Wire protocol for the realtime plan stream
//!
//! Frames are JSON envelopes discriminated by a `type` tag. Inbound
//! frames decode into the [`ClientEvent`] vocabulary; unknown types are
//! dropped with a diagnostic, never an error, so newer backends keep
//! working against older clients.

mod envelope;
mod error_text;
mod events;

pub use envelope::Envelope;
pub use error_text::{extract_error_text, format_error_block};
pub use events::{ClientEvent, decode_frame};
