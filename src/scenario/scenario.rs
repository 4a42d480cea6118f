use clap::Parser;
use serde::Deserialize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("number_cores must be at least 1")]
    NoCores,
    #[error("contenders ({contenders}) must hold at least one race ({cores} cores)")]
    PoolTooSmall { contenders: usize, cores: usize },
    #[error("keeptop ({keeptop}) cannot exceed number_cores ({cores})")]
    KeepTooMany { keeptop: usize, cores: usize },
    #[error("timeout must be at least 1 second")]
    NoTimeout,
    #[error("{0} is a percentage and must be at most 100")]
    BadPercentage(&'static str),
    #[error("verbosity must be 0, 1 or 2")]
    BadVerbosity,
    #[error("gb_read_time must be at least 1 second")]
    BadTick,
    #[error("the {0:?} method needs a feature generator")]
    MissingFeatureGen(AcMethod),
}

/// the configuration method steering ranking and pool evolution
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize,
)]
pub enum AcMethod {
    #[value(name = "reactr")]
    ReACTR,
    #[value(name = "reactrpp")]
    ReACTRpp,
    #[value(name = "cppl")]
    Cppl,
}

impl std::fmt::Display for AcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReACTR => write!(f, "ReACTR"),
            Self::ReACTRpp => write!(f, "ReACTRpp"),
            Self::Cppl => write!(f, "CPPL"),
        }
    }
}

/// every knob of one configuration run
#[derive(Debug, Clone, Parser, Serialize)]
#[command(author, version, about = "realtime algorithm configuration by racing")]
pub struct Scenario {
    /// number of target algorithms racing in parallel
    #[arg(short = 'n', long, default_value_t = 1)]
    pub number_cores: usize,
    /// size of the persistent configuration pool
    #[arg(short = 'c', long, default_value_t = 30)]
    pub contenders: usize,
    /// top configurations automatically kept between races
    #[arg(long, default_value_t = 2)]
    pub keeptop: usize,
    /// wall-clock budget per instance in seconds
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,
    /// percent chance of a random replacement instead of crossover
    #[arg(long, default_value_t = 25)]
    pub chance: u32,
    /// percent chance of mutating each gene during crossover
    #[arg(long, default_value_t = 10)]
    pub mutate: u32,
    /// sigma below which a configuration may be replaced
    #[arg(long, default_value_t = 5.0)]
    pub kill: f64,
    /// seed the pool with the default configuration
    #[arg(long, default_value_t = false)]
    pub pws: bool,
    /// rank races by objective value instead of runtime
    #[arg(long, default_value_t = false)]
    pub objective_min: bool,
    /// run only the default configuration on a single core
    #[arg(long, default_value_t = false)]
    pub baselineperf: bool,
    /// continue from the last persisted tournament
    #[arg(long, default_value_t = false)]
    pub resume: bool,
    /// load the tournament-0 snapshot and replay from there
    #[arg(long, default_value_t = false)]
    pub experimental: bool,
    /// 0 quiet, 1 informative, 2 chatty
    #[arg(short = 'v', long, default_value_t = 0)]
    pub verbosity: u8,
    /// configuration method
    #[arg(long, value_enum, default_value = "reactr")]
    pub ac: AcMethod,
    /// enable mid-race loss prediction and speculative races
    #[arg(long, default_value_t = false)]
    pub gray_box: bool,
    /// seconds between gray-box prediction ticks
    #[arg(long, default_value_t = 2)]
    pub gb_read_time: u64,
    /// path to the target-algorithm wrapper definition
    #[arg(short = 'w', long)]
    pub wrapper: PathBuf,
    /// wrapper name override; defaults to the definition's name
    #[arg(long, default_value = "")]
    pub wrapper_name: String,
    /// instance feature generator: "" or "file"
    #[arg(long, default_value = "")]
    pub feature_gen: String,
    /// directory the run logs into
    #[arg(long, default_value = "logs")]
    pub log_folder: PathBuf,
    /// configuration space definition (json or pcs)
    #[arg(long)]
    pub param_file: PathBuf,
    /// text file with one instance path per line
    #[arg(long)]
    pub instance_file: PathBuf,
    /// seed for reproducible pool evolution
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Scenario {
    /// normalize and sanity-check; baseline runs force a single core
    pub fn validated(mut self) -> Result<Self, ScenarioError> {
        if self.baselineperf {
            self.number_cores = 1;
            self.keeptop = self.keeptop.min(1);
        }
        self.number_cores = self.number_cores.min(num_cpus::get());
        if self.number_cores == 0 {
            return Err(ScenarioError::NoCores);
        }
        if self.contenders < self.number_cores || self.contenders < 2 {
            return Err(ScenarioError::PoolTooSmall {
                contenders: self.contenders,
                cores: self.number_cores,
            });
        }
        if !self.baselineperf && self.keeptop > self.number_cores {
            return Err(ScenarioError::KeepTooMany {
                keeptop: self.keeptop,
                cores: self.number_cores,
            });
        }
        if self.timeout == 0 {
            return Err(ScenarioError::NoTimeout);
        }
        if self.chance > 100 {
            return Err(ScenarioError::BadPercentage("chance"));
        }
        if self.mutate > 100 {
            return Err(ScenarioError::BadPercentage("mutate"));
        }
        if self.verbosity > 2 {
            return Err(ScenarioError::BadVerbosity);
        }
        if self.gray_box && self.gb_read_time == 0 {
            return Err(ScenarioError::BadTick);
        }
        if self.ac == AcMethod::Cppl && self.feature_gen.is_empty() {
            return Err(ScenarioError::MissingFeatureGen(self.ac));
        }
        Ok(self)
    }

    /// log directory of this run: one folder per (wrapper, method) pair
    pub fn log_dir(&self) -> PathBuf {
        self.log_folder
            .join(format!("{}_{}", self.wrapper_name, self.ac))
    }
}
