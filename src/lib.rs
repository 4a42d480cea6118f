pub mod driver;
pub mod graybox;
pub mod pool;
pub mod race;
pub mod ranking;
pub mod scenario;
pub mod space;
pub mod wrapper;

/// dimensional analysis types
type Mu = f64;
type Sigma = f64;
type Objective = f64;

// trueskill parameters; these are the numerical contract of the ranking
// update, not tunables
const INITIAL_MU: Mu = 25.0;
const INITIAL_SIGMA: Sigma = INITIAL_MU / 3.0;
const BETA: f64 = INITIAL_SIGMA / 2.0;
const DYNAMICS: f64 = INITIAL_SIGMA / 300.0;
const DRAW_PROBABILITY: f64 = 0.10;

// race supervision parameters
const HUGE: Objective = f64::MAX * 1e-100;
const WATCH_POLL: std::time::Duration = std::time::Duration::from_secs(1);
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(1);
const INTERIM_WINDOW: usize = 16;

// genetic operator parameters
const BREEDING_POOL: usize = 5;

/// initialize logging: terminal at the scenario's verbosity, plus an
/// appending debug writer for general.log inside the log directory
pub fn init(dir: &std::path::Path, verbosity: u8) {
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("general.log"))
            .expect("open general.log"),
    );
    let term = simplelog::TermLogger::new(
        level,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
}

/// derive a reproducible rng for one round of pool evolution
fn round_rng(seed: u64, round: usize) -> rand::rngs::SmallRng {
    use rand::SeedableRng;
    use std::hash::Hash;
    use std::hash::Hasher;
    let ref mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.hash(hasher);
    round.hash(hasher);
    rand::rngs::SmallRng::seed_from_u64(hasher.finish())
}
