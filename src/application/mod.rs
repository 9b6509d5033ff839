//! Application layer - Use cases and port interfaces
//!
//! Contains the capture session, its event plumbing and the conversion
//! use case, plus trait definitions for device, encoder and transcoder
//! back-ends.

pub mod convert;
pub mod events;
pub mod negotiate;
pub mod ports;
pub mod recorder;

pub use convert::convert_with;
pub use events::{EventHub, EventKind, Handler, PublishReport, RecorderEvent, Subscription};
pub use negotiate::negotiate;
pub use recorder::{MissingCollaborator, Recorder, RecorderBuilder};
