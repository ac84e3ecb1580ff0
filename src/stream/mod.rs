//! Sources, sinks, and the channels between them
//!
//! A [`Source`] is a re-readable description of an asynchronous sequence and
//! is consumed through effects (`fold`, `collect`, `pipe`, ...). A [`Sink`]
//! is the receiving side: values are posted until it completes or fails.
//! [`Source::merge`] interleaves many sources, taking whichever is ready first.

pub mod channel;
mod merge;
pub mod sink;
pub mod source;


pub use channel::{Channel, ChannelStatus};
pub use sink::{Choice, Sink};
pub use source::{Source, SourceIterator};
