mod instances;
mod params;
mod scenario;

pub use instances::*;
pub use params::*;
pub use scenario::*;
