//! srlx Pipeline - Concurrent relation extraction
//!
//! Wires a [`DataSource`] through a pool of extraction workers and a bounded
//! hand-off queue into an [`srlx_sink::ItemSink`].

pub mod pipeline;
pub mod queue;
pub mod source;

pub use pipeline::{ExtractionPipeline, PipelineReport};
pub use queue::{handoff_queue, HandoffReceiver, HandoffSender};
pub use source::{DataSource, FileSource, VecSource};
