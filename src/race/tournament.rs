use super::*;
use crate::space::ConfigId;
use crate::space::Configuration;
use crate::wrapper::Wrapper;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread::JoinHandle;
use std::time::Duration;

/// one race: a set of differently configured target algorithms solving the
/// same instance in parallel under a shared wall-clock budget
pub struct Tournament {
    state: Arc<RaceState>,
    wrapper: Arc<dyn Wrapper>,
    timeout: Duration,
    objective_min: bool,
    id: String,
    tourn_nr: usize,
    instance: String,
    ids: Vec<Option<ConfigId>>,
    handles: Vec<Option<JoinHandle<()>>>,
}

impl Tournament {
    pub fn new(
        state: Arc<RaceState>,
        wrapper: Arc<dyn Wrapper>,
        timeout: Duration,
        objective_min: bool,
    ) -> Self {
        let cores = state.cores();
        Self {
            state,
            wrapper,
            timeout,
            objective_min,
            id: String::new(),
            tourn_nr: 0,
            instance: String::new(),
            ids: vec![None; cores],
            handles: (0..cores).map(|_| None).collect(),
        }
    }

    /// launch workers for the given (core, configuration) pairs; all of
    /// them clear the same start barrier, so their wall clocks agree
    pub fn start(
        &mut self,
        instance: &str,
        contenders: Vec<(usize, Configuration)>,
        tourn_nr: usize,
    ) {
        self.instance = instance.to_string();
        self.tourn_nr = tourn_nr;
        self.id = uuid::Uuid::new_v4().simple().to_string();
        log::info!(
            "starting tournament {} (nr. {}) on instance {}",
            self.id,
            self.tourn_nr,
            self.instance
        );
        self.launch(contenders);
        self.state.mark_started();
    }

    /// add workers to an already running race on the listed cores
    pub fn fill(&mut self, contenders: Vec<(usize, Configuration)>) {
        self.launch(contenders);
    }

    fn launch(&mut self, contenders: Vec<(usize, Configuration)>) {
        let barrier = Arc::new(Barrier::new(contenders.len() + 1));
        for (core, config) in contenders {
            self.ids[core] = Some(config.id());
            let worker = Worker::new(
                core,
                &self.instance,
                config,
                self.wrapper.clone(),
                self.state.clone(),
            );
            self.handles[core] = Some(worker.spawn(barrier.clone()));
        }
        barrier.wait();
    }

    /// block until every worker is done or the budget expires; the budget
    /// is whole seconds, so a coarse poll is enough
    pub fn watch(&mut self) {
        loop {
            if self.done() {
                break;
            }
            if self.state.elapsed() >= self.timeout {
                self.close();
                break;
            }
            self.repin();
            std::thread::sleep(crate::WATCH_POLL);
        }
        self.reap();
    }

    fn done(&self) -> bool {
        self.handles.iter().flatten().all(|h| h.is_finished())
    }

    /// re-apply core pins so freshly forked grandchildren stay on their core
    fn repin(&self) {
        for core in 0..self.state.cores() {
            if self.state.status(core) == SlotStatus::Running {
                let pid = self.state.pid(core);
                if pid > 0 {
                    affinity::pin_tree(pid as u32, core);
                }
            }
        }
    }

    /// terminate every live slot and reap all workers; idempotent per slot
    pub fn close(&mut self) {
        if !self.state.cancelled() {
            self.state.cancel();
            log::info!(
                "closing tournament nr. {} (id {}) due to timeout ({}s)",
                self.tourn_nr,
                self.id,
                self.timeout.as_secs()
            );
            if self.objective_min {
                // grace so well-behaved targets can print a final best
                std::thread::sleep(crate::SHUTDOWN_GRACE);
            }
        }
        for core in 0..self.state.cores() {
            self.terminate(core);
        }
        self.reap();
    }

    fn terminate(&self, core: usize) {
        let was_running = self
            .state
            .transition(core, SlotStatus::Running, SlotStatus::TimeoutKilled);
        let _ = self
            .state
            .transition(core, SlotStatus::AwaitingStart, SlotStatus::TimeoutKilled);
        let _ = self
            .state
            .transition(core, SlotStatus::AwaitingStartEs, SlotStatus::TimeoutKilled);
        if was_running {
            // winning the kill transition hands the slot's cells over
            self.state
                .record_wall(core, self.state.elapsed().as_secs_f64());
            let pid = self.state.pid(core);
            if pid > 0 {
                affinity::kill_tree(pid as u32);
            }
        }
    }

    fn reap(&mut self) {
        for handle in self.handles.iter_mut() {
            if let Some(h) = handle.take() {
                let _ = h.join();
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn tourn_nr(&self) -> usize {
        self.tourn_nr
    }
    pub fn instance(&self) -> &str {
        &self.instance
    }
    pub fn state(&self) -> &Arc<RaceState> {
        &self.state
    }
    pub fn contender_ids(&self) -> &[Option<ConfigId>] {
        &self.ids
    }
}

/// single-slot kill used by the gray-box overlay; the race stays watchable
pub fn kill_early(state: &RaceState, core: usize) {
    if state.transition(core, SlotStatus::Running, SlotStatus::EarlyKilled) {
        log::info!("early termination of core {}", core);
        state.record_wall(core, state.elapsed().as_secs_f64());
        let pid = state.pid(core);
        if pid > 0 {
            affinity::kill_tree(pid as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Configuration;
    use crate::wrapper::CommandWrapper;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn config() -> Configuration {
        Configuration::new(BTreeMap::new())
    }

    fn delayed(seconds: f64) -> Configuration {
        let mut params = BTreeMap::new();
        params.insert("delay".into(), crate::space::ParamValue::Float(seconds));
        Configuration::new(params)
    }

    /// wrapper that races `sh -c` scripts; the script body stands in for
    /// the instance path, parameters arrive as positional arguments
    fn shell() -> Arc<dyn Wrapper> {
        Arc::new(CommandWrapper::script("sh"))
    }

    #[test]
    fn fast_single_worker_wins() {
        let state = Arc::new(RaceState::new(1));
        let mut tournament = Tournament::new(
            state.clone(),
            shell(),
            Duration::from_secs(10),
            false,
        );
        let script = "echo result 1.0 0.2";
        tournament.start(script, vec![(0, config())], 0);
        tournament.watch();
        assert!(state.status(0) == SlotStatus::FinishedOk);
        assert!(state.winner_slot() == Some(0));
        assert!(state.objective(0) == 1.0);
        assert!(state.runtime(0) == 0.2);
        assert!(state.wall_runtime(0) < 5.0);
    }

    #[test]
    fn straggler_is_timeout_killed() {
        let state = Arc::new(RaceState::new(2));
        let mut tournament = Tournament::new(
            state.clone(),
            shell(),
            Duration::from_secs(1),
            false,
        );
        let script = "sleep 30";
        tournament.start(script, vec![(0, config()), (1, config())], 0);
        tournament.watch();
        assert!(state.status(0) == SlotStatus::TimeoutKilled);
        assert!(state.status(1) == SlotStatus::TimeoutKilled);
        assert!(state.winner_slot() == None);
        assert!(state.objective(0) == crate::HUGE);
        // timeout plus poll granularity, never the target's 30s
        assert!(state.wall_runtime(0) < 4.0);
    }

    #[test]
    fn fastest_of_mixed_field_claims_the_win() {
        let state = Arc::new(RaceState::new(2));
        let mut tournament = Tournament::new(
            state.clone(),
            shell(),
            Duration::from_secs(10),
            false,
        );
        let script = "sleep $1; echo result 1.0 $1";
        tournament.start(script, vec![(0, delayed(1.5)), (1, delayed(0.2))], 0);
        tournament.watch();
        assert!(state.status(0) == SlotStatus::FinishedOk);
        assert!(state.status(1) == SlotStatus::FinishedOk);
        assert!(state.winner_slot() == Some(1));
        assert!(state.runtime(1) == 0.2);
        assert!(state.wall_runtime(1) < state.wall_runtime(0));
    }

    #[test]
    fn missing_target_surfaces_as_failure() {
        let state = Arc::new(RaceState::new(1));
        let wrapper: Arc<dyn Wrapper> =
            Arc::new(CommandWrapper::script("definitely-not-a-binary"));
        let mut tournament =
            Tournament::new(state.clone(), wrapper, Duration::from_secs(5), false);
        tournament.start("echo nope", vec![(0, config())], 0);
        tournament.watch();
        assert!(state.status(0) == SlotStatus::FinishedFail);
        assert!(state.objective(0) == crate::HUGE);
        assert!(state.winner_slot() == None);
    }
}
