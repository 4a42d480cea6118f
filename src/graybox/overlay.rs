use super::*;
use crate::race::RaceState;
use crate::race::SlotStatus;
use crate::race::Tournament;
use crate::race::kill_early;
use crate::space::ConfigId;
use crate::space::Configuration;
use crate::wrapper::Wrapper;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

/// everything the supervisor thread needs to watch one primary race
pub struct OverlayConfig {
    pub primary: Arc<RaceState>,
    /// per-core configuration embeddings of the primary contenders
    pub descriptors: Vec<Vec<f64>>,
    pub predictor: Arc<Mutex<dyn LossPredictor>>,
    pub wrapper: Arc<dyn Wrapper>,
    pub next_instance: Option<String>,
    /// per-core picks for a speculative race on the next instance
    pub speculative: Vec<Configuration>,
    pub timeout: Duration,
    pub tick: Duration,
    pub objective_min: bool,
    pub tourn_nr: usize,
}

/// a finished speculative race, handed back to the driver for regular
/// result processing
pub struct SpeculativeRace {
    pub instance: String,
    pub id: String,
    pub budget: Duration,
    pub state: Arc<RaceState>,
    pub ids: Vec<Option<ConfigId>>,
    pub contenders: Vec<(usize, Configuration)>,
}

/// gray-box supervisor: ticks alongside a primary race, early-kills
/// predicted losers, and races the next instance on the freed cores with
/// the unused budget carried over
pub struct Overlay {
    handle: JoinHandle<Option<SpeculativeRace>>,
}

impl Overlay {
    pub fn spawn(config: OverlayConfig) -> Self {
        Self {
            handle: std::thread::Builder::new()
                .name("graybox".into())
                .spawn(move || supervise(config))
                .expect("spawn graybox supervisor"),
        }
    }

    /// join the supervisor; a speculative race is returned fully watched
    pub fn finish(self) -> Option<SpeculativeRace> {
        self.handle.join().expect("graybox supervisor panicked")
    }
}

fn supervise(config: OverlayConfig) -> Option<SpeculativeRace> {
    let mut speculative: Option<(Tournament, SpeculativeRace)> = None;
    while !config.primary.all_done() {
        std::thread::sleep(config.tick);
        if config.primary.all_done() {
            break;
        }
        let trained = config.predictor.lock().expect("poisoned").trained();
        if !trained || speculative.is_some() {
            continue;
        }
        let victims = {
            let live = telemetry(&config);
            config
                .predictor
                .lock()
                .expect("poisoned")
                .termination_list(&live)
        };
        if victims.is_empty() {
            continue;
        }
        for &core in victims.iter() {
            kill_early(&config.primary, core);
        }
        if let Some(instance) = config.next_instance.as_deref() {
            speculative = Some(launch(&config, instance, &victims));
        }
    }
    let (mut tournament, race) = speculative?;
    // the primary is over: hand the remaining cores to the speculative race
    let pending = race
        .contenders
        .iter()
        .filter(|(core, _)| race.state.status(*core) == SlotStatus::AwaitingStartEs)
        .cloned()
        .collect::<Vec<_>>();
    if !pending.is_empty() {
        tournament.fill(pending);
    }
    tournament.watch();
    Some(SpeculativeRace {
        ids: tournament.contender_ids().to_vec(),
        ..race
    })
}

/// start the next-instance race on the freed cores, carrying the unused
/// share of the primary budget on top of a full timeout
fn launch(
    config: &OverlayConfig,
    instance: &str,
    freed: &[usize],
) -> (Tournament, SpeculativeRace) {
    let advantage = config.timeout.saturating_sub(config.primary.elapsed());
    let budget = config.timeout + advantage;
    let cores = config.primary.cores();
    let state = Arc::new(RaceState::new(cores));
    let contenders = config
        .speculative
        .iter()
        .take(cores)
        .cloned()
        .enumerate()
        .collect::<Vec<_>>();
    for core in 0..cores {
        if !freed.contains(&core) {
            state.set_status(core, SlotStatus::AwaitingStartEs);
        }
    }
    let mut tournament = Tournament::new(
        state.clone(),
        config.wrapper.clone(),
        budget,
        config.objective_min,
    );
    let first = contenders
        .iter()
        .filter(|(core, _)| freed.contains(core))
        .cloned()
        .collect::<Vec<_>>();
    tournament.start(instance, first, config.tourn_nr + 1);
    log::info!(
        "speculative race on {} using cores {:?} with a budget of {}s",
        instance,
        freed,
        budget.as_secs()
    );
    let race = SpeculativeRace {
        instance: instance.to_string(),
        id: tournament.id().to_string(),
        budget,
        state,
        ids: Vec::new(),
        contenders,
    };
    (tournament, race)
}

/// live view of every still-running primary slot
fn telemetry(config: &OverlayConfig) -> Vec<SlotTelemetry> {
    let elapsed = config.primary.elapsed().as_secs_f64();
    (0..config.primary.cores())
        .filter(|&core| config.primary.status(core) == SlotStatus::Running)
        .map(|core| SlotTelemetry {
            core,
            elapsed,
            interim: config.primary.latest_interim(core).unwrap_or_default(),
            descriptor: config.descriptors.get(core).cloned().unwrap_or_default(),
        })
        .collect()
}
