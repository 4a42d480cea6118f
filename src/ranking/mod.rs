mod cppl;
mod ranker;
mod trueskill;

pub use cppl::*;
pub use ranker::*;
pub use trueskill::*;
