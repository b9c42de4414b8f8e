#![forbid(unsafe_code)]

//! HTTP abstraction used by the playlist and fragment download paths.
//!
//! The [`Net`] trait is the seam the rest of the engine programs against;
//! [`HttpClient`] is the reqwest-backed production implementation and
//! [`RetryNet`] a bounded-retry decorator layered on top of any `Net`.

mod client;
mod error;
mod retry;
mod traits;
mod types;

pub use crate::{
    client::HttpClient,
    error::{NetError, NetResult},
    retry::{DefaultRetryPolicy, RetryNet},
    traits::{Net, NetExt},
    types::{Headers, NetOptions, RangeSpec, RetryPolicy},
};

/// Mock API for the [`Net`] trait, available to dependent crates' tests
/// via the `mock` feature.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    pub use crate::traits::NetMock;
}
