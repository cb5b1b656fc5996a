//! quickswitch - label-to-key learning engine for quick model switching.
//!
//! The host chat application exposes no API for "select model X"; the only
//! lever is a URL query parameter, and the only feedback is the label the
//! host renders in its switcher control afterwards. This crate infers which
//! parameter value activates which named model by attempting speculative
//! switches, watching the host confirm (or not) within a bounded wait, and
//! remembering confirmed associations across sessions.
//!
//! The injected button bar and other DOM plumbing live outside this crate;
//! they talk to [`SwitchEngine`] through the traits in [`host`] and feed the
//! [`observer::ChangeObserver`] with the host's mutation events.

#![forbid(unsafe_code)]

pub mod engine;
pub mod error;
pub mod host;
pub mod labels;
pub mod observer;
pub mod store;
pub mod wait;

pub use engine::{ConfirmedVia, EngineSnapshot, SwitchEngine, SwitchOutcome};
pub use error::{Error, Result};
pub use wait::SwitchTiming;
