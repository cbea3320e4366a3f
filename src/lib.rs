//! Shared pieces of the worker binaries: the concrete protocol clients
//! and the file-mask compiler the engine consumes as a pure function.

pub mod client;
pub mod masks;
