use super::*;
use crate::race::SlotStatus;
use crate::space::ConfigId;
use crate::wrapper::InterimMeaning;
use std::collections::BTreeMap;

/// everything the ranking and evolution stages need to know about one
/// finished race; runtimes of unfinished slots are already reset to the
/// scenario timeout
#[derive(Debug, Clone)]
pub struct RaceOutcome {
    pub ids: Vec<ConfigId>,
    pub cores: Vec<usize>,
    pub objectives: Vec<f64>,
    pub runtimes: Vec<f64>,
    pub wall_runtimes: Vec<f64>,
    pub statuses: Vec<SlotStatus>,
    pub interims: Vec<Vec<Vec<f64>>>,
    pub first_finisher: Option<usize>,
}

impl RaceOutcome {
    pub fn len(&self) -> usize {
        self.ids.len()
    }
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
    fn finished(&self, i: usize) -> bool {
        self.statuses[i] == SlotStatus::FinishedOk && self.objectives[i] < crate::HUGE
    }
}

/// the configured ranking method, routed through one interface
pub enum Ranker {
    ReACTR,
    ReACTRpp { meanings: Vec<InterimMeaning> },
    Cppl(Box<Cppl>),
}

impl Ranker {
    /// index of the race winner: fastest in runtime mode, best objective in
    /// objective mode; sentinel-only races have none
    pub fn winner(&self, outcome: &RaceOutcome, objective_min: bool) -> Option<usize> {
        let candidates = (0..outcome.len())
            .filter(|&i| outcome.finished(i))
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return None;
        }
        let key = |i: usize| {
            if objective_min {
                outcome.objectives[i]
            } else {
                outcome.runtimes[i]
            }
        };
        let mut best = candidates[0];
        for &i in candidates.iter().skip(1) {
            if key(i) < key(best) {
                best = i;
            }
        }
        match self {
            Self::ReACTRpp { meanings } if objective_min => {
                // break exact objective ties on aggregated interim ranks
                let interim = interim_scores(outcome, meanings);
                let mut winner = best;
                for &i in candidates.iter() {
                    if key(i) == key(best) && interim[i] < interim[winner] {
                        winner = i;
                    }
                }
                Some(winner)
            }
            _ => Some(best),
        }
    }

    /// ranks handed to the skill update; the winner's rank is the lowest
    pub fn ranks(&self, outcome: &RaceOutcome, winner: usize, objective_min: bool) -> Vec<usize> {
        match self {
            Self::ReACTR | Self::Cppl(_) => (0..outcome.len())
                .map(|i| if i == winner { 1 } else { 2 })
                .collect(),
            Self::ReACTRpp { meanings } => {
                let interim = interim_scores(outcome, meanings);
                let mut ranks = if objective_min {
                    let objective = dense_ranks(&outcome.objectives);
                    let tiebreak = dense_ranks(&interim);
                    let pairs = objective
                        .iter()
                        .zip(tiebreak.iter())
                        .map(|(&o, &s)| (o * (outcome.len() + 1) + s) as f64)
                        .collect::<Vec<_>>();
                    dense_ranks(&pairs)
                } else {
                    dense_ranks(&interim)
                };
                ranks[winner] = 0;
                ranks
            }
        }
    }

    /// fold the race into the scores (trueskill) or the bandit state (cppl)
    pub fn update(
        &mut self,
        scores: &mut BTreeMap<ConfigId, Score>,
        outcome: &RaceOutcome,
        winner: usize,
        objective_min: bool,
    ) {
        match self {
            Self::Cppl(cppl) => cppl.update(outcome.ids[winner], &outcome.ids),
            _ => {
                let ranks = self.ranks(outcome, winner, objective_min);
                let mut individuals = outcome
                    .ids
                    .iter()
                    .zip(ranks)
                    .map(|(id, rank)| Individual {
                        score: scores.get(id).copied().unwrap_or_default(),
                        rank,
                    })
                    .collect::<Vec<_>>();
                adjust(&mut individuals);
                for (id, individual) in outcome.ids.iter().zip(individuals) {
                    scores.insert(*id, individual.score);
                }
            }
        }
    }

    pub fn cppl(&mut self) -> Option<&mut Cppl> {
        match self {
            Self::Cppl(cppl) => Some(cppl.as_mut()),
            _ => None,
        }
    }
}

/// dense ranks, 1-based: equal values share a rank and no rank is skipped
pub fn dense_ranks(values: &[f64]) -> Vec<usize> {
    let mut distinct = values.to_vec();
    distinct.sort_by(|a, b| a.partial_cmp(b).expect("comparable values"));
    distinct.dedup();
    values
        .iter()
        .map(|v| 1 + distinct.iter().position(|d| d == v).expect("present"))
        .collect()
}

/// per-core aggregation of interim signals: each dimension is dense-ranked
/// in its declared direction, ranks are summed across dimensions; cores
/// without interim data rank worst in every dimension
fn interim_scores(outcome: &RaceOutcome, meanings: &[InterimMeaning]) -> Vec<f64> {
    let n = outcome.len();
    let mut scores = vec![0.0; n];
    for (dim, meaning) in meanings.iter().enumerate() {
        let worst = 1.0 + n as f64;
        let raw = (0..n)
            .map(|i| {
                outcome.interims[i]
                    .last()
                    .and_then(|v| v.get(dim))
                    .copied()
            })
            .collect::<Vec<_>>();
        let present = raw.iter().flatten().cloned().collect::<Vec<_>>();
        if present.is_empty() {
            continue;
        }
        let ranks = dense_ranks(&present);
        let mut next = 0;
        for (i, value) in raw.iter().enumerate() {
            match value {
                Some(_) => {
                    let rank = ranks[next] as f64;
                    next += 1;
                    scores[i] += match meaning {
                        InterimMeaning::Decrease => rank,
                        InterimMeaning::Increase => 1.0 + present.len() as f64 - rank,
                    };
                }
                None => scores[i] += worst,
            }
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(objectives: Vec<f64>, runtimes: Vec<f64>) -> RaceOutcome {
        let n = objectives.len();
        RaceOutcome {
            ids: (0..n).map(|_| uuid::Uuid::new_v4()).collect(),
            cores: (0..n).collect(),
            objectives,
            runtimes,
            wall_runtimes: vec![0.0; n],
            statuses: vec![SlotStatus::FinishedOk; n],
            interims: vec![Vec::new(); n],
            first_finisher: None,
        }
    }

    #[test]
    fn runtime_mode_takes_the_fastest_finisher() {
        let ranker = Ranker::ReACTR;
        let outcome = outcome(vec![3.0, 1.0, 2.0], vec![9.0, 7.0, 4.0]);
        assert!(ranker.winner(&outcome, false) == Some(2));
        assert!(ranker.winner(&outcome, true) == Some(1));
    }

    #[test]
    fn sentinels_are_ignored_unless_total() {
        let ranker = Ranker::ReACTR;
        let mut o = outcome(vec![crate::HUGE, 5.0], vec![1.0, 8.0]);
        // the fast slot never reported, so the slow finisher wins
        assert!(ranker.winner(&o, false) == Some(1));
        o.objectives[1] = crate::HUGE;
        assert!(ranker.winner(&o, false) == None);
    }

    #[test]
    fn reactr_ranks_are_winner_and_the_rest() {
        let ranker = Ranker::ReACTR;
        let o = outcome(vec![1.0, 2.0, 3.0], vec![5.0, 2.0, 9.0]);
        let winner = ranker.winner(&o, false).expect("finite results");
        assert!(ranker.ranks(&o, winner, false) == vec![2, 1, 2]);
    }

    #[test]
    fn interim_signals_break_objective_ties() {
        let ranker = Ranker::ReACTRpp {
            meanings: vec![InterimMeaning::Decrease],
        };
        let mut o = outcome(vec![9.0, 7.5, 8.0, 7.5], vec![1.0; 4]);
        o.interims[1] = vec![vec![3.0]];
        o.interims[3] = vec![vec![5.0]];
        // cores 1 and 3 tie at 7.5; core 1's last interim is better
        assert!(ranker.winner(&o, true) == Some(1));
        let ranks = ranker.ranks(&o, 1, true);
        assert!(ranks[1] == 0);
        assert!(ranks[3] < ranks[0]);
    }

    #[test]
    fn increase_meaning_prefers_larger_interims() {
        let ranker = Ranker::ReACTRpp {
            meanings: vec![InterimMeaning::Increase],
        };
        let mut o = outcome(vec![5.0, 5.0], vec![1.0, 1.0]);
        o.interims[0] = vec![vec![10.0]];
        o.interims[1] = vec![vec![20.0]];
        assert!(ranker.winner(&o, true) == Some(1));
    }

    #[test]
    fn dense_ranks_have_no_gaps() {
        assert!(dense_ranks(&[4.0, 1.0, 4.0, 9.0]) == vec![2, 1, 2, 3]);
        assert!(dense_ranks(&[2.0, 2.0, 2.0]) == vec![1, 1, 1]);
    }
}
