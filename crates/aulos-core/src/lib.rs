#![forbid(unsafe_code)]

//! Shared primitives for the aulos player engine.
//!
//! This crate sits at the bottom of the workspace and carries only plain
//! data types used across the pipeline crates. No I/O, no async.

mod track;

pub use track::{PlaylistType, TrackType, NORMAL_RATE};
