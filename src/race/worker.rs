use super::*;
use crate::space::Configuration;
use crate::wrapper::TargetEvent;
use crate::wrapper::Wrapper;
use std::io::BufRead;
use std::io::BufReader;
use std::process::Child;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread::JoinHandle;
use std::time::Instant;

/// environment clamps applied to every target invocation so numeric
/// libraries inside the target cannot fan threads out across cores
const SINGLE_THREAD_ENV: [(&str, &str); 4] = [
    ("OMP_NUM_THREADS", "1"),
    ("OPENBLAS_NUM_THREADS", "1"),
    ("MKL_NUM_THREADS", "1"),
    ("NUMEXPR_NUM_THREADS", "1"),
];

/// one slot of a race: runs a single target-algorithm invocation on its
/// core and writes the outcome into the shared race state
pub struct Worker {
    core: usize,
    instance: String,
    config: Configuration,
    wrapper: Arc<dyn Wrapper>,
    state: Arc<RaceState>,
}

impl Worker {
    pub fn new(
        core: usize,
        instance: &str,
        config: Configuration,
        wrapper: Arc<dyn Wrapper>,
        state: Arc<RaceState>,
    ) -> Self {
        Self {
            core,
            instance: instance.to_string(),
            config,
            wrapper,
            state,
        }
    }

    pub fn spawn(self, barrier: Arc<Barrier>) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name(format!("race-{}", self.core))
            .spawn(move || self.run(barrier))
            .expect("spawn worker thread")
    }

    fn run(self, barrier: Arc<Barrier>) {
        let argv = self.wrapper.translate_config(&self.instance, &self.config);
        barrier.wait();
        if self.state.cancelled() {
            return;
        }
        if !self
            .state
            .transition(self.core, SlotStatus::AwaitingStart, SlotStatus::Running)
            && !self
                .state
                .transition(self.core, SlotStatus::AwaitingStartEs, SlotStatus::Running)
        {
            return;
        }
        let begun = Instant::now();
        if let Err(e) = affinity::pin_self(self.core) {
            log::debug!("worker thread pin to core {} failed: {}", self.core, e);
        }
        let mut child = match self.launch(&argv) {
            Ok(child) => child,
            Err(e) => {
                log::warn!(
                    "target {} missing or unlaunchable on core {}: {}",
                    argv.first().map(String::as_str).unwrap_or("<none>"),
                    self.core,
                    e
                );
                if self
                    .state
                    .transition(self.core, SlotStatus::Running, SlotStatus::FinishedFail)
                {
                    self.state
                        .record_wall(self.core, begun.elapsed().as_secs_f64());
                }
                return;
            }
        };
        self.state.set_pid(self.core, child.id() as i32);
        affinity::pin_tree(child.id(), self.core);
        if self.state.cancelled() {
            affinity::kill_tree(child.id());
        }
        let last = self.stream(&mut child);
        let exit = child.wait();
        self.state.set_pid(self.core, 0);
        self.finish(last, exit, begun.elapsed().as_secs_f64());
    }

    fn launch(&self, argv: &[String]) -> std::io::Result<Child> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| std::io::Error::other("wrapper produced an empty command line"))?;
        Command::new(program)
            .args(args)
            .envs(SINGLE_THREAD_ENV)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
    }

    /// drain the child's stdout through the wrapper parser; interim events
    /// land in the shared ring, the last final event is returned
    fn stream(&self, child: &mut Child) -> Option<(f64, f64)> {
        let Some(stdout) = child.stdout.take() else {
            return None;
        };
        let mut last = None;
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            match self.wrapper.parse_line(&line) {
                Some(TargetEvent::Interim(values)) => self.state.push_interim(self.core, values),
                Some(TargetEvent::Final { objective, runtime }) => {
                    last = Some((objective, runtime))
                }
                None => {}
            }
        }
        last
    }

    /// winning the status transition is what licenses writing the result
    /// cells: a supervisor that already moved the slot into a killed state
    /// owns it, and a late result is dropped rather than recorded
    fn finish(&self, last: Option<(f64, f64)>, exit: std::io::Result<ExitStatus>, wall: f64) {
        match (exit, last) {
            (Ok(status), Some((objective, runtime))) if status.success() => {
                if self
                    .state
                    .transition(self.core, SlotStatus::Running, SlotStatus::FinishedOk)
                {
                    self.state.record_result(self.core, objective, runtime);
                    self.state.record_wall(self.core, wall);
                    self.state.claim_win(self.core);
                }
            }
            (Ok(status), _) => {
                if self
                    .state
                    .transition(self.core, SlotStatus::Running, SlotStatus::FinishedFail)
                {
                    self.state.record_wall(self.core, wall);
                    log::debug!(
                        "target on core {} ended without a usable result ({})",
                        self.core,
                        status
                    );
                }
            }
            (Err(e), _) => {
                if self
                    .state
                    .transition(self.core, SlotStatus::Running, SlotStatus::FinishedFail)
                {
                    self.state.record_wall(self.core, wall);
                }
                log::warn!("reaping target on core {} failed: {}", self.core, e);
            }
        }
    }
}
