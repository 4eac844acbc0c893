//! focus.observation.v1 schema
//!
//! This module defines the input schema consumed by the engine: per-frame
//! landmark observations and the message envelope accepted on live
//! connections.

mod observation;
mod reader;

pub use observation::*;
pub use reader::*;
