//! Safe SQL builder: identifiers from compiled resources only, values as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
