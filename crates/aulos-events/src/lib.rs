#![forbid(unsafe_code)]

//! Playback events and the broadcast bus they travel on.
//!
//! Policy decisions that affect overall playback (rampdown, retune,
//! abort) are escalated through these events rather than by failing out
//! of the owning component.

mod bus;
mod event;

pub use bus::EventBus;
pub use event::{PlayerEvent, TuneFailure};
