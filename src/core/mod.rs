//! Core types shared by every layer: constants, errors, the codec seam and
//! the message envelope.

pub mod constants;
mod error;
mod message;
mod traits;

pub use constants::*;
pub use error::*;
pub use message::Message;
pub use traits::{CborCodec, Codec};
