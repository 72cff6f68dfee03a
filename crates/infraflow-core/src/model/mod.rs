//! Resource model
//!
//! Typed descriptions of desired infrastructure state.

mod kind;
mod resource;
mod value;

pub use kind::*;
pub use resource::*;
pub use value::*;
