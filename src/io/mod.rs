pub mod export;
pub mod project_file;
pub mod render;

pub use export::*;
pub use project_file::*;
pub use render::*;
