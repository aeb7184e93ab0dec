//! Domain module for broadcast intake
//!
//! Contains envelopes, responses, classification results and errors.

pub mod envelope;
pub mod errors;
pub mod message;
pub mod response;

pub use envelope::*;
pub use errors::*;
pub use message::*;
pub use response::*;
