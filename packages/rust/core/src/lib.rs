//! Result-enrichment and streaming-output pipeline for zivi.
//!
//! This crate ties together paced detail fetching, the record transforms of
//! `zivi-records`, and incremental output framing into end-to-end runs
//! (e.g., `run_search`).

pub mod assembler;
pub mod pipeline;
pub mod sequencer;
pub mod sink;

pub use assembler::{Emission, Frame, FrameState, Layout, Payload, Position, Target, Unit};
pub use pipeline::{
    ProgressReporter, RunOptions, RunSummary, SilentProgress, run_convert, run_details,
    run_search,
};
pub use sequencer::{DetailSource, PacedFetcher, jittered_interval};
pub use sink::{Sink, SinkMode, WriteTarget};
