mod overlay;
mod predictor;

pub use overlay::*;
pub use predictor::*;
