pub mod filter;
pub mod sort;

pub use filter::*;
pub use sort::*;
