pub mod display;
pub mod outcome;
pub mod project;
pub mod stage;

pub use display::*;
pub use outcome::*;
pub use project::*;
pub use stage::*;
