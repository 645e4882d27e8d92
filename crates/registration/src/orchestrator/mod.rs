pub mod runner;
pub mod workflow;

pub use runner::*;
pub use workflow::*;
