pub mod controller;
pub mod staleness;
pub mod synchronizer;
pub mod workbench;

pub use controller::*;
pub use staleness::*;
pub use synchronizer::*;
pub use workbench::*;
