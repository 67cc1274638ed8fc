//! Storage contracts implemented by the persistence crate.

mod traits;

pub use traits::*;
