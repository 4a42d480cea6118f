use crate::race::SlotStatus;
use crate::ranking::RaceOutcome;
use crate::space::ConfigId;
use serde::Deserialize;
use serde::Serialize;

/// append-only record of one finished tournament
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentStats {
    pub id: String,
    pub tourn_nr: usize,
    pub instance: String,
    pub contenders: Vec<ConfigId>,
    pub winner: Option<ConfigId>,
    pub objectives: Vec<f64>,
    pub runtimes: Vec<f64>,
    pub wall_runtimes: Vec<f64>,
    pub statuses: Vec<SlotStatus>,
}

impl TournamentStats {
    pub fn new(id: &str, tourn_nr: usize, instance: &str, outcome: &RaceOutcome) -> Self {
        Self {
            id: id.to_string(),
            tourn_nr,
            instance: instance.to_string(),
            contenders: outcome.ids.clone(),
            winner: outcome.first_finisher.map(|i| outcome.ids[i]),
            objectives: outcome.objectives.clone(),
            runtimes: outcome.runtimes.clone(),
            wall_runtimes: outcome.wall_runtimes.clone(),
            statuses: outcome.statuses.clone(),
        }
    }
}
