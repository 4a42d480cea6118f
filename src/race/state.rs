use super::*;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

const NO_WINNER: usize = usize::MAX;

/// shared result bundle for one race. each slot is written by its own
/// worker; the supervising tournament only performs kill transitions, and
/// those are compare-and-set so the two writers never collide: a slot's
/// result cells belong to whichever side wins its status transition, so a
/// worker whose target was killed mid-finish drops its result instead of
/// recording it. the winner cell is claimed at most once, by the first
/// worker to finish cleanly.
pub struct RaceState {
    slots: Vec<Slot>,
    winner: AtomicUsize,
    cancel: AtomicBool,
    start: Mutex<Option<Instant>>,
}

struct Slot {
    status: AtomicU8,
    pid: AtomicI32,
    objective: AtomicU64,
    runtime: AtomicU64,
    wall: AtomicU64,
    interim: Mutex<VecDeque<Vec<f64>>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(SlotStatus::AwaitingStart as u8),
            pid: AtomicI32::new(0),
            objective: AtomicU64::new(crate::HUGE.to_bits()),
            runtime: AtomicU64::new(crate::HUGE.to_bits()),
            wall: AtomicU64::new(0f64.to_bits()),
            interim: Mutex::new(VecDeque::new()),
        }
    }
}

impl RaceState {
    pub fn new(cores: usize) -> Self {
        assert!(cores > 0, "a race needs at least one core");
        Self {
            slots: (0..cores).map(|_| Slot::new()).collect(),
            winner: AtomicUsize::new(NO_WINNER),
            cancel: AtomicBool::new(false),
            start: Mutex::new(None),
        }
    }

    pub fn cores(&self) -> usize {
        self.slots.len()
    }

    pub fn status(&self, core: usize) -> SlotStatus {
        SlotStatus::from_u8(self.slots[core].status.load(Ordering::SeqCst))
    }

    pub fn set_status(&self, core: usize, status: SlotStatus) {
        self.slots[core].status.store(status as u8, Ordering::SeqCst);
    }

    /// compare-and-set status transition; false if someone else moved first
    pub fn transition(&self, core: usize, from: SlotStatus, to: SlotStatus) -> bool {
        self.slots[core]
            .status
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn pid(&self, core: usize) -> i32 {
        self.slots[core].pid.load(Ordering::SeqCst)
    }

    pub fn set_pid(&self, core: usize, pid: i32) {
        self.slots[core].pid.store(pid, Ordering::SeqCst);
    }

    pub fn objective(&self, core: usize) -> f64 {
        f64::from_bits(self.slots[core].objective.load(Ordering::SeqCst))
    }

    pub fn runtime(&self, core: usize) -> f64 {
        f64::from_bits(self.slots[core].runtime.load(Ordering::SeqCst))
    }

    pub fn wall_runtime(&self, core: usize) -> f64 {
        f64::from_bits(self.slots[core].wall.load(Ordering::SeqCst))
    }

    pub fn record_result(&self, core: usize, objective: f64, runtime: f64) {
        self.slots[core]
            .objective
            .store(objective.to_bits(), Ordering::SeqCst);
        self.slots[core]
            .runtime
            .store(runtime.to_bits(), Ordering::SeqCst);
    }

    pub fn record_wall(&self, core: usize, wall: f64) {
        self.slots[core].wall.store(wall.to_bits(), Ordering::SeqCst);
    }

    /// append one interim vector, keeping only the trailing window
    pub fn push_interim(&self, core: usize, values: Vec<f64>) {
        let mut ring = self.slots[core].interim.lock().expect("poisoned");
        if ring.len() == crate::INTERIM_WINDOW {
            ring.pop_front();
        }
        ring.push_back(values);
    }

    pub fn interim(&self, core: usize) -> Vec<Vec<f64>> {
        let ring = self.slots[core].interim.lock().expect("poisoned");
        ring.iter().cloned().collect()
    }

    pub fn latest_interim(&self, core: usize) -> Option<Vec<f64>> {
        let ring = self.slots[core].interim.lock().expect("poisoned");
        ring.back().cloned()
    }

    /// claimed by the first successful finisher
    pub fn claim_win(&self, core: usize) -> bool {
        self.winner
            .compare_exchange(NO_WINNER, core, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn winner_slot(&self) -> Option<usize> {
        match self.winner.load(Ordering::SeqCst) {
            NO_WINNER => None,
            core => Some(core),
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// stamp the shared start instant; the first stamp wins
    pub fn mark_started(&self) {
        let mut start = self.start.lock().expect("poisoned");
        if start.is_none() {
            *start = Some(Instant::now());
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start
            .lock()
            .expect("poisoned")
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn all_done(&self) -> bool {
        (0..self.cores()).all(|core| self.status(core).is_done())
    }
}
