mod error;
pub use error::*;

pub mod rte;
