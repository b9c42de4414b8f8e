#![forbid(unsafe_code)]

//! Adaptive bitrate profile selection.
//!
//! The [`ProfileSelector`] owns the profile ladder and decides rampup /
//! rampdown from throughput estimates and buffer occupancy. It is
//! protocol-agnostic: the HLS layer feeds it samples and consults it
//! between fragments.
//!
//! Two decision paths exist:
//! - [`ProfileSelector::evaluate`] — the steady-state heuristics run at
//!   each opportunity (after each injected fragment, network-idle
//!   points),
//! - [`ProfileSelector::ramp_down`] — the direct path taken immediately
//!   on HTTP 404/500/502/503/partial-file fragment failures and on
//!   repeated timeouts, bypassing the heuristics.
//!
//! When steady-state counters and the hard rampdown limit fire in the
//! same evaluation window, rampdown wins the tie-break and the pair
//! counts as a single rampdown against the limit.

mod estimator;
mod selector;
mod types;

pub use estimator::{Estimator, ThroughputEstimator, ThroughputSample};
pub use selector::ProfileSelector;
pub use types::{AbrOptions, ProfileInfo, SwitchDecision, SwitchReason};
