//! Input/output helpers.
//!
//! - plate-map loaders (`platemap`)
//! - vendor reader-export parsing (`reader`)
//! - result exports (CSV/JSON) (`export`)

pub mod export;
pub mod platemap;
pub mod reader;

pub use export::*;
pub use platemap::*;
pub use reader::*;
