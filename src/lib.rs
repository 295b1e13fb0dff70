//! Incremental transcode bridge: drives a blocking, file-descriptor-oriented
//! codec from asynchronous, chunked, push-style input through a pair of
//! emulated character devices and a serialized job queue.

pub mod args;
pub mod codec;
pub mod input;
pub mod output;
pub mod processor;
pub mod queue;
pub mod sink;
