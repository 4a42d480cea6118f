mod engine;
mod logs;
mod manager;
mod stats;

pub use engine::*;
pub use logs::*;
pub use manager::*;
pub use stats::*;
