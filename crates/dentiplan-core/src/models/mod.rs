//! Domain models for dentiplan.

mod candidate;
mod plan;
mod reference;

pub use candidate::*;
pub use plan::*;
pub use reference::*;

pub(crate) use plan::string_list;
