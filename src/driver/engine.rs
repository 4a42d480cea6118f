use super::*;
use crate::graybox::CostLogistic;
use crate::graybox::LossPredictor;
use crate::pool::PoolManager;
use crate::ranking::Cppl;
use crate::ranking::Ranker;
use crate::scenario::AcMethod;
use crate::scenario::Scenario;
use crate::scenario::load_space;
use crate::scenario::read_instances;
use crate::wrapper::CommandWrapper;
use crate::wrapper::FeatureGen;
use crate::wrapper::FileFeatures;
use crate::wrapper::NoFeatures;
use crate::wrapper::Wrapper;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

/// the outer stream driver: feeds instances to the tournament manager one
/// at a time and skips the ones a speculative race already solved
pub struct Rtac {
    scenario: Arc<Scenario>,
    manager: TournamentManager,
    predictor: Option<Arc<Mutex<dyn LossPredictor>>>,
    skip: HashSet<String>,
}

impl Rtac {
    /// the log directory must already be prepared (`Logs::new`) and the
    /// logger installed before this runs
    pub fn new(scenario: Scenario, logs: Logs) -> anyhow::Result<Self> {
        let scenario = Arc::new(scenario);
        let space = Arc::new(load_space(&scenario.param_file)?);
        let wrapper = load_wrapper(&scenario)?;
        let feature_gen = load_feature_gen(&scenario);
        let seed = scenario.seed.unwrap_or_else(|| {
            let seed = rand::random();
            log::info!("seeding this run with {}", seed);
            seed
        });
        let ranker = match scenario.ac {
            AcMethod::ReACTR => Ranker::ReACTR,
            AcMethod::ReACTRpp => Ranker::ReACTRpp {
                meanings: wrapper.interim_info(),
            },
            AcMethod::Cppl => Ranker::Cppl(Box::new(Cppl::new(
                space.clone(),
                feature_gen,
                0.0001,
                1.0,
                0.2,
            ))),
        };
        let pool = PoolManager::new(
            space.clone(),
            ranker,
            seed,
            scenario.contenders,
            scenario.number_cores,
            scenario.keeptop,
            scenario.chance,
            scenario.mutate,
            scenario.kill,
            scenario.pws,
            scenario.objective_min,
        );
        logs.scenario(scenario.as_ref())?;
        let predictor = scenario.gray_box.then(|| {
            Arc::new(Mutex::new(CostLogistic::new(wrapper.interim_info().len())))
                as Arc<Mutex<dyn LossPredictor>>
        });
        let manager =
            TournamentManager::new(scenario.clone(), space, wrapper, logs, pool)?;
        Ok(Self {
            scenario,
            manager,
            predictor,
            skip: HashSet::new(),
        })
    }

    /// drive the whole instance stream
    pub fn run(&mut self) -> anyhow::Result<()> {
        let instances = read_instances(&self.scenario.instance_file)?;
        for i in 0..instances.len() {
            let instance = instances[i].clone();
            if self.skip.remove(&instance) {
                log::info!(
                    "instance {} already solved in a speculative race, continuing",
                    instance
                );
                continue;
            }
            log::info!("starting instance {}", instance);
            let next = instances.get(i + 1).map(String::as_str);
            let report =
                self.manager
                    .solve_instance(&instance, next, self.predictor.as_ref())?;
            self.announce(&instance, &report);
            if let Some(speculative) = &report.speculative {
                if speculative.solved {
                    self.skip.insert(speculative.instance.clone());
                }
            }
        }
        Ok(())
    }

    fn announce(&self, instance: &str, report: &InstanceReport) {
        if self.scenario.objective_min {
            if report.solved {
                log::info!(
                    "solved instance {} with objective value {}",
                    instance,
                    report.best_objective
                );
            } else {
                log::warn!(
                    "instance {} could not be solved within {}s",
                    instance,
                    self.scenario.timeout
                );
            }
        } else if report.best_runtime < self.scenario.timeout as f64 {
            log::info!("solved instance {} in {}s", instance, report.best_runtime);
        } else {
            log::warn!(
                "instance {} could not be solved within {}s",
                instance,
                self.scenario.timeout
            );
        }
    }
}

/// the wrapper seam: a command-line wrapper definition loaded from disk
fn load_wrapper(scenario: &Scenario) -> anyhow::Result<Arc<dyn Wrapper>> {
    let wrapper = CommandWrapper::load(&scenario.wrapper)?;
    Ok(Arc::new(wrapper))
}

fn load_feature_gen(scenario: &Scenario) -> Arc<dyn FeatureGen> {
    match scenario.feature_gen.as_str() {
        "file" => Arc::new(FileFeatures),
        _ => Arc::new(NoFeatures),
    }
}

/// resolve the wrapper name used in the log directory layout before any
/// logging starts
pub fn resolve_wrapper_name(scenario: &mut Scenario) {
    if scenario.wrapper_name.is_empty() {
        scenario.wrapper_name = scenario
            .wrapper
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "wrapper".to_string());
    }
}
