use super::*;
use crate::graybox::LossPredictor;
use crate::graybox::Overlay;
use crate::graybox::OverlayConfig;
use crate::graybox::SlotTelemetry;
use crate::pool::PoolManager;
use crate::race::RaceState;
use crate::race::SlotStatus;
use crate::race::Tournament;
use crate::ranking::RaceOutcome;
use crate::scenario::Scenario;
use crate::space::ConfigId;
use crate::space::ConfigSpace;
use crate::space::Configuration;
use crate::wrapper::Wrapper;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

/// what the outer stream driver needs to know about one solved instance
#[derive(Debug, Clone)]
pub struct InstanceReport {
    pub winner: Option<ConfigId>,
    pub best_runtime: f64,
    pub best_objective: f64,
    pub solved: bool,
    pub speculative: Option<SpeculativeReport>,
}

#[derive(Debug, Clone)]
pub struct SpeculativeReport {
    pub instance: String,
    pub solved: bool,
}

/// per-instance driver: draws contenders, runs the race, feeds the ranker
/// and the pool, and keeps the persisted state current
pub struct TournamentManager {
    scenario: Arc<Scenario>,
    space: Arc<ConfigSpace>,
    wrapper: Arc<dyn Wrapper>,
    logs: Logs,
    pool: PoolManager,
    tourn_nr: usize,
}

impl TournamentManager {
    pub fn new(
        scenario: Arc<Scenario>,
        space: Arc<ConfigSpace>,
        wrapper: Arc<dyn Wrapper>,
        logs: Logs,
        mut pool: PoolManager,
    ) -> anyhow::Result<Self> {
        let mut tourn_nr = 0;
        if scenario.resume {
            tourn_nr = logs.last_tourn_nr()?;
            let (p, s, ids) = logs.load(tourn_nr, false)?;
            pool.restore(p, s, ids);
            log::info!("resuming from tournament {}", tourn_nr);
        } else if scenario.experimental {
            let (p, s, ids) = logs.load(0, true)?;
            pool.restore(p, s, ids);
            log::info!("experimental run from the tournament 0 snapshot");
        }
        logs.ranking(pool.pool(), pool.scores(), pool.contender_ids(), tourn_nr)?;
        Ok(Self {
            scenario,
            space,
            wrapper,
            logs,
            pool,
            tourn_nr,
        })
    }

    pub fn tourn_nr(&self) -> usize {
        self.tourn_nr
    }

    pub fn pool(&self) -> &PoolManager {
        &self.pool
    }

    pub fn solve_instance(
        &mut self,
        instance: &str,
        next_instance: Option<&str>,
        predictor: Option<&Arc<Mutex<dyn LossPredictor>>>,
    ) -> anyhow::Result<InstanceReport> {
        let state = Arc::new(RaceState::new(self.scenario.number_cores));
        let contenders = if self.scenario.baselineperf {
            vec![(0, self.space.sample_default())]
        } else {
            self.pool.contender_set()
        };
        let timeout = Duration::from_secs(self.scenario.timeout);
        let mut tournament = Tournament::new(
            state.clone(),
            self.wrapper.clone(),
            timeout,
            self.scenario.objective_min,
        );
        tournament.start(instance, contenders.clone(), self.tourn_nr);

        let overlay = match (self.scenario.gray_box, predictor) {
            (true, Some(predictor)) => Some(Overlay::spawn(OverlayConfig {
                primary: state.clone(),
                descriptors: contenders
                    .iter()
                    .map(|(_, c)| self.space.vectorize(c))
                    .collect(),
                predictor: predictor.clone(),
                wrapper: self.wrapper.clone(),
                next_instance: next_instance.map(str::to_string),
                speculative: self.pool.preview(self.scenario.number_cores, self.tourn_nr),
                timeout,
                tick: Duration::from_secs(self.scenario.gb_read_time),
                objective_min: self.scenario.objective_min,
                tourn_nr: self.tourn_nr,
            })),
            _ => None,
        };

        tournament.watch();

        let outcome = collect_outcome(
            &state,
            tournament.contender_ids(),
            self.scenario.timeout as f64,
        );
        let stats = TournamentStats::new(tournament.id(), self.tourn_nr, instance, &outcome);
        let report = self.absorb(stats, &outcome, instance, &contenders, predictor)?;

        match overlay.map(Overlay::finish) {
            Some(Some(race)) => {
                let outcome = collect_outcome(
                    &race.state,
                    &race.ids,
                    (race.budget.as_secs()) as f64,
                );
                let stats =
                    TournamentStats::new(&race.id, self.tourn_nr, &race.instance, &outcome);
                let spec_report =
                    self.absorb(stats, &outcome, &race.instance, &race.contenders, predictor)?;
                Ok(InstanceReport {
                    speculative: Some(SpeculativeReport {
                        instance: race.instance,
                        solved: spec_report.solved,
                    }),
                    ..report
                })
            }
            _ => Ok(report),
        }
    }

    /// fold one finished race into the ranker, the pool, and the logs
    fn absorb(
        &mut self,
        stats: TournamentStats,
        outcome: &RaceOutcome,
        instance: &str,
        contenders: &[(usize, Configuration)],
        predictor: Option<&Arc<Mutex<dyn LossPredictor>>>,
    ) -> anyhow::Result<InstanceReport> {
        let winner_index = if self.scenario.baselineperf {
            None
        } else {
            self.pool.process(outcome, instance, self.tourn_nr)
        };
        log::info!(
            "winner of tournament {} (nr. {}) is {}",
            stats.id,
            self.tourn_nr,
            winner_index
                .map(|i| outcome.ids[i].simple().to_string())
                .unwrap_or_else(|| "0".to_string())
        );
        if let (Some(predictor), Some(winner)) = (predictor, winner_index) {
            self.train(predictor, outcome, winner, contenders);
        }
        self.logs.race(&stats)?;
        self.tourn_nr += 1;
        self.logs.ranking(
            self.pool.pool(),
            self.pool.scores(),
            self.pool.contender_ids(),
            self.tourn_nr,
        )?;
        let best_runtime = outcome
            .runtimes
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        let best_objective = outcome
            .objectives
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        Ok(InstanceReport {
            winner: winner_index.map(|i| outcome.ids[i]),
            best_runtime,
            best_objective,
            solved: best_objective < crate::HUGE,
            speculative: None,
        })
    }

    /// accumulate winner-versus-loser rows and refit the loss predictor
    fn train(
        &self,
        predictor: &Arc<Mutex<dyn LossPredictor>>,
        outcome: &RaceOutcome,
        winner: usize,
        contenders: &[(usize, Configuration)],
    ) {
        let telemetry = |i: usize| SlotTelemetry {
            core: outcome.cores[i],
            elapsed: outcome.wall_runtimes[i],
            interim: outcome.interims[i].last().cloned().unwrap_or_default(),
            descriptor: contenders
                .iter()
                .find(|(core, _)| *core == outcome.cores[i])
                .map(|(_, c)| self.space.vectorize(c))
                .unwrap_or_default(),
        };
        let key = |i: usize| {
            if self.scenario.objective_min {
                outcome.objectives[i]
            } else {
                outcome.runtimes[i]
            }
        };
        let champion = telemetry(winner);
        let mut losers = Vec::new();
        let mut margins = Vec::new();
        for i in 0..outcome.len() {
            if i == winner {
                continue;
            }
            losers.push(telemetry(i));
            let margin = (key(i).min(crate::HUGE) - key(winner))
                / self.scenario.timeout.max(1) as f64;
            margins.push(margin.clamp(0.0, 1.0).max(0.05));
        }
        let mut predictor = predictor.lock().expect("poisoned");
        predictor.prepare_train_data(&champion, &losers, &margins);
        predictor.train();
    }
}

/// snapshot the shared race state into a plain outcome; unfinished slots
/// get their runtime reset to the scenario timeout
pub fn collect_outcome(
    state: &RaceState,
    ids: &[Option<ConfigId>],
    timeout: f64,
) -> RaceOutcome {
    let mut outcome = RaceOutcome {
        ids: Vec::new(),
        cores: Vec::new(),
        objectives: Vec::new(),
        runtimes: Vec::new(),
        wall_runtimes: Vec::new(),
        statuses: Vec::new(),
        interims: Vec::new(),
        first_finisher: None,
    };
    for core in 0..state.cores() {
        let Some(id) = ids[core] else { continue };
        outcome.ids.push(id);
        outcome.cores.push(core);
        // only a cleanly finished slot may contribute its result cells; a
        // killed slot collapses to the sentinel whatever the cells hold
        let status = state.status(core);
        let objective = if status == SlotStatus::FinishedOk {
            state.objective(core)
        } else {
            crate::HUGE
        };
        outcome.objectives.push(objective);
        outcome.runtimes.push(if objective >= crate::HUGE {
            timeout
        } else {
            state.runtime(core)
        });
        outcome.wall_runtimes.push(state.wall_runtime(core));
        outcome.statuses.push(status);
        outcome.interims.push(state.interim(core));
    }
    outcome.first_finisher = state
        .winner_slot()
        .and_then(|slot| outcome.cores.iter().position(|&c| c == slot));
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolManager;
    use crate::ranking::Ranker;
    use crate::scenario::Scenario;
    use crate::space::Distribution;
    use crate::space::Domain;
    use crate::space::ParamDef;
    use crate::space::ParamValue;
    use crate::wrapper::CommandWrapper;
    use clap::Parser;
    use std::path::Path;

    fn space() -> Arc<ConfigSpace> {
        Arc::new(
            ConfigSpace::new(vec![(
                "rate".into(),
                ParamDef {
                    domain: Domain::Continuous {
                        min: 0.0,
                        max: 1.0,
                        log: false,
                        distribution: Distribution::Uniform,
                    },
                    default: ParamValue::Float(0.5),
                    condition: None,
                },
            )])
            .expect("valid space"),
        )
    }

    fn scenario(dir: &Path, resume: bool, baseline: bool) -> Scenario {
        let mut scenario = Scenario::parse_from([
            "racetune",
            "--wrapper",
            "sh.json",
            "--param-file",
            "params.json",
            "--instance-file",
            "instances.txt",
            "--number-cores",
            "2",
            "--contenders",
            "6",
            "--keeptop",
            "1",
            "--timeout",
            "5",
            "--seed",
            "9",
        ]);
        scenario.log_folder = dir.to_path_buf();
        scenario.wrapper_name = "sh".into();
        scenario.resume = resume;
        scenario.baselineperf = baseline;
        scenario
    }

    fn manager(scenario: Scenario) -> TournamentManager {
        let scenario = Arc::new(scenario);
        let space = space();
        let wrapper: Arc<dyn Wrapper> = Arc::new(CommandWrapper::script("sh"));
        let logs = Logs::new(
            &scenario.log_dir(),
            scenario.objective_min,
            scenario.resume,
            scenario.experimental,
        )
        .expect("log dir");
        let pool = PoolManager::new(
            space.clone(),
            Ranker::ReACTR,
            9,
            scenario.contenders,
            scenario.number_cores,
            scenario.keeptop,
            scenario.chance,
            scenario.mutate,
            scenario.kill,
            scenario.pws,
            scenario.objective_min,
        );
        TournamentManager::new(scenario, space, wrapper, logs, pool).expect("manager")
    }

    #[test]
    fn tournament_numbers_advance_and_persist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut manager = manager(scenario(dir.path(), false, false));
        let script = "echo result 1.0 0.1";
        for expected in 1..=2 {
            let report = manager.solve_instance(script, None, None).expect("solved");
            assert!(report.solved);
            assert!(manager.tourn_nr() == expected);
        }
        let log_dir = dir.path().join("sh_ReACTR");
        let winners = std::fs::read_to_string(log_dir.join("winner.log")).expect("read");
        assert!(winners.lines().count() == 2);
        let nr = std::fs::read_to_string(log_dir.join("tourn_nr.log")).expect("read");
        assert!(nr.trim() == "2");
        assert!(log_dir.join("pool_tourn_2.log").exists());
    }

    #[test]
    fn resume_continues_from_the_persisted_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = "echo result 1.0 0.1";
        let parked = {
            let mut manager = manager(scenario(dir.path(), false, false));
            manager.solve_instance(script, None, None).expect("solved");
            manager.solve_instance(script, None, None).expect("solved");
            (
                manager.pool().pool().clone(),
                manager.pool().contender_ids().to_vec(),
            )
        };
        let resumed = manager(scenario(dir.path(), true, false));
        assert!(resumed.tourn_nr() == 2);
        assert!(resumed.pool().pool() == &parked.0);
        assert!(resumed.pool().contender_ids() == parked.1.as_slice());
    }

    #[test]
    fn unsolvable_instance_reports_and_still_advances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut manager = manager(scenario(dir.path(), false, false));
        let report = manager
            .solve_instance("exit 1", None, None)
            .expect("processed");
        assert!(!report.solved);
        assert!(report.winner == None);
        assert!(manager.tourn_nr() == 1);
    }

    #[test]
    fn killed_slots_never_count_as_finished() {
        let state = RaceState::new(2);
        let ids = vec![Some(uuid::Uuid::new_v4()), Some(uuid::Uuid::new_v4())];
        // a result lands in the cells right as the supervisor kills the slot
        state.set_status(0, SlotStatus::Running);
        state.record_result(0, 3.0, 1.0);
        assert!(state.transition(0, SlotStatus::Running, SlotStatus::TimeoutKilled));
        state.set_status(1, SlotStatus::FinishedOk);
        state.record_result(1, 9.0, 8.0);
        let outcome = collect_outcome(&state, &ids, 30.0);
        assert!(outcome.objectives[0] == crate::HUGE);
        assert!(outcome.runtimes[0] == 30.0);
        let ranker = Ranker::ReACTR;
        assert!(ranker.winner(&outcome, false) == Some(1));
        assert!(ranker.winner(&outcome, true) == Some(1));
    }

    #[test]
    fn baseline_runs_the_default_and_touches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut manager = manager(scenario(dir.path(), false, true));
        let scores = manager.pool().scores().clone();
        let report = manager
            .solve_instance("echo result 1.0 0.2", None, None)
            .expect("solved");
        assert!(report.solved);
        assert!(manager.tourn_nr() == 1);
        assert!(manager.pool().scores() == &scores);
    }
}

