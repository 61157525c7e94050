pub mod compiler;
pub mod types;

pub use compiler::{CompileError, QueryCompiler};
pub use types::*;
