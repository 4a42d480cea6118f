use crate::ranking::RaceOutcome;
use crate::ranking::Ranker;
use crate::ranking::Score;
use crate::space::ConfigId;
use crate::space::ConfigSpace;
use crate::space::Configuration;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::BTreeMap;
use std::sync::Arc;

/// the persistent population, in insertion order: replacements drop the
/// old member and append the new one at the end
pub type ContenderPool = Vec<Configuration>;
/// skill estimates over exactly the pool's ids
pub type ScoreBook = BTreeMap<ConfigId, Score>;

/// holds the population between races: updates skills from race outcomes,
/// replaces weak members via the genetic operator, and draws the next
/// contender set
pub struct PoolManager {
    space: Arc<ConfigSpace>,
    ranker: Ranker,
    pool: ContenderPool,
    scores: ScoreBook,
    contender_ids: Vec<ConfigId>,
    default_id: Option<ConfigId>,
    objective_min: bool,
    seed: u64,
    contenders: usize,
    cores: usize,
    keeptop: usize,
    chance: u32,
    mutate: u32,
    kill: f64,
}

impl PoolManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        space: Arc<ConfigSpace>,
        mut ranker: Ranker,
        seed: u64,
        contenders: usize,
        cores: usize,
        keeptop: usize,
        chance: u32,
        mutate: u32,
        kill: f64,
        pws: bool,
        objective_min: bool,
    ) -> Self {
        assert!(cores <= contenders, "pool smaller than one race");
        assert!(keeptop <= cores, "cannot keep more than a race holds");
        let ref mut rng = crate::round_rng(seed, usize::MAX);
        let mut pool = ContenderPool::new();
        let mut scores = ScoreBook::new();
        let mut default_id = None;
        if pws {
            let default = space.sample_default();
            default_id = Some(default.id());
            scores.insert(default.id(), Score::default());
            if let Some(cppl) = ranker.cppl() {
                cppl.register(&default);
            }
            pool.push(default);
        }
        while pool.len() < contenders {
            let config = space.sample_random(rng);
            scores.insert(config.id(), Score::default());
            if let Some(cppl) = ranker.cppl() {
                cppl.register(&config);
            }
            pool.push(config);
        }
        // first contender set: the default (when present) plus random picks
        let others = pool
            .iter()
            .map(Configuration::id)
            .filter(|id| Some(*id) != default_id)
            .collect::<Vec<_>>();
        let mut contender_ids = default_id.into_iter().collect::<Vec<_>>();
        contender_ids.extend(
            others
                .choose_multiple(rng, cores - contender_ids.len())
                .cloned(),
        );
        Self {
            space,
            ranker,
            pool,
            scores,
            contender_ids,
            default_id,
            objective_min,
            seed,
            contenders,
            cores,
            keeptop,
            chance,
            mutate,
            kill,
        }
    }

    /// the configurations racing next, in slot order
    pub fn contender_set(&self) -> Vec<(usize, Configuration)> {
        self.contender_ids
            .iter()
            .enumerate()
            .map(|(core, id)| (core, self.member(*id).clone()))
            .collect()
    }

    pub fn contender_ids(&self) -> &[ConfigId] {
        &self.contender_ids
    }
    pub fn pool(&self) -> &ContenderPool {
        &self.pool
    }
    pub fn scores(&self) -> &ScoreBook {
        &self.scores
    }
    pub fn ranker(&self) -> &Ranker {
        &self.ranker
    }

    fn member(&self, id: ConfigId) -> &Configuration {
        self.pool
            .iter()
            .find(|c| c.id() == id)
            .expect("contender belongs to the pool")
    }

    /// uniform draw used for speculative races; does not advance any state
    pub fn preview(&self, count: usize, round: usize) -> Vec<Configuration> {
        let ref mut rng = crate::round_rng(self.seed, round.wrapping_mul(31).wrapping_add(17));
        self.pool
            .choose_multiple(rng, count.min(self.pool.len()))
            .cloned()
            .collect()
    }

    /// adopt a persisted state (resume)
    pub fn restore(&mut self, pool: ContenderPool, scores: ScoreBook, ids: Vec<ConfigId>) {
        if let Some(cppl) = self.ranker.cppl() {
            for config in pool.iter() {
                cppl.register(config);
            }
        }
        self.default_id = self
            .default_id
            .filter(|id| pool.iter().any(|c| c.id() == *id));
        self.pool = pool;
        self.scores = scores;
        self.contender_ids = ids;
    }

    /// full post-race pass: skill update and replacement when someone won,
    /// then selection of the next contender set
    pub fn process(
        &mut self,
        outcome: &RaceOutcome,
        instance: &str,
        tourn_nr: usize,
    ) -> Option<usize> {
        let winner = self.ranker.winner(outcome, self.objective_min);
        if let Some(winner) = winner {
            self.ranker
                .update(&mut self.scores, outcome, winner, self.objective_min);
            self.manage(tourn_nr);
        }
        self.select_next(instance, tourn_nr);
        winner
    }

    /// replacement pass: every confidently-ranked, below-median member is
    /// replaced, either by a fresh random configuration or by crossover of
    /// two of the best five
    fn manage(&mut self, tourn_nr: usize) {
        let ref mut rng = crate::round_rng(self.seed, tourn_nr * 2);
        if self.ranker.cppl().is_some() {
            return self.manage_bandit(rng);
        }
        let ids = self.pool.iter().map(Configuration::id).collect::<Vec<_>>();
        for id in ids {
            if Some(id) == self.default_id {
                continue;
            }
            if self.scores[&id].sigma > self.kill {
                continue;
            }
            let best = self.by_ascending_mu();
            let median = self.scores[&best[self.contenders / 2]].mu;
            if self.scores[&id].mu >= median {
                continue;
            }
            let replacement = self.offspring(&best, rng);
            self.replace(id, replacement);
        }
        debug_assert!(self.pool.len() == self.contenders);
        debug_assert!(self.scores.len() == self.contenders);
    }

    /// one replacement event: a single donor draw serves as both the
    /// random-replacement candidate and the mutation source in crossover
    fn offspring<R: Rng>(&self, best: &[ConfigId], rng: &mut R) -> Configuration {
        let donor = self.space.sample_random(rng);
        let roll = rng.random_range(1.0..=100.0);
        if roll <= self.chance as f64 {
            donor
        } else {
            let top = &best[best.len() - crate::BREEDING_POOL.min(best.len())..];
            let parents = top.choose_multiple(rng, 2).collect::<Vec<_>>();
            let (a, b) = match parents.as_slice() {
                [a, b] => (self.member(**a), self.member(**b)),
                _ => unreachable!("breeding pool holds at least two members"),
            };
            self.space.recombine(a, b, &donor, self.mutate, rng)
        }
    }

    fn replace(&mut self, old: ConfigId, new: Configuration) {
        log::debug!(
            "replacing contender {} with {}",
            old.simple(),
            new.id().simple()
        );
        self.pool.retain(|c| c.id() != old);
        self.scores.remove(&old);
        if let Some(cppl) = self.ranker.cppl() {
            cppl.forget(old);
            cppl.register(&new);
        }
        self.scores.insert(new.id(), Score::default());
        self.pool.push(new);
    }

    fn manage_bandit<R: Rng>(&mut self, rng: &mut R) {
        let ids = self.pool.iter().map(Configuration::id).collect::<Vec<_>>();
        let discards = self
            .ranker
            .cppl()
            .expect("bandit mode")
            .discards(&ids);
        for id in discards {
            if Some(id) == self.default_id {
                continue;
            }
            let best = self.by_ascending_mu();
            let replacement = self.offspring(&best, rng);
            self.replace(id, replacement);
        }
    }

    /// keep the top configurations, fill the remaining race slots by
    /// uniform draw without replacement from the rest of the pool
    fn select_next(&mut self, instance: &str, tourn_nr: usize) {
        let ref mut rng = crate::round_rng(self.seed, tourn_nr * 2 + 1);
        if let Some(cppl) = self.ranker.cppl() {
            cppl.observe_instance(instance);
            let ids = self.pool.iter().map(Configuration::id).collect::<Vec<_>>();
            self.contender_ids = cppl.select(&ids, self.cores);
            return;
        }
        let best = self.by_ascending_mu();
        let mut next = best
            .iter()
            .rev()
            .take(self.keeptop)
            .cloned()
            .collect::<Vec<_>>();
        let rest = self
            .pool
            .iter()
            .map(Configuration::id)
            .filter(|id| !next.contains(id))
            .collect::<Vec<_>>();
        next.extend(rest.choose_multiple(rng, self.cores - next.len()).cloned());
        self.contender_ids = next;
    }

    /// pool ids sorted by mu, worst first; ties keep pool order
    fn by_ascending_mu(&self) -> Vec<ConfigId> {
        let mut ids = self.pool.iter().map(Configuration::id).collect::<Vec<_>>();
        ids.sort_by(|a, b| {
            self.scores[a]
                .mu
                .partial_cmp(&self.scores[b].mu)
                .expect("comparable skills")
        });
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::SlotStatus;
    use crate::space::Distribution;
    use crate::space::Domain;
    use crate::space::ParamDef;
    use crate::space::ParamValue;

    fn space() -> Arc<ConfigSpace> {
        Arc::new(
            ConfigSpace::new(vec![
                (
                    "level".into(),
                    ParamDef {
                        domain: Domain::Discrete {
                            min: 0,
                            max: 10,
                            log: false,
                        },
                        default: ParamValue::Int(5),
                        condition: None,
                    },
                ),
                (
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
                ),
            ])
            .expect("valid space"),
        )
    }

    fn manager(chance: u32, pws: bool) -> PoolManager {
        PoolManager::new(
            space(),
            Ranker::ReACTR,
            7,
            10,
            4,
            2,
            chance,
            10,
            5.0,
            pws,
            false,
        )
    }

    fn outcome(manager: &PoolManager, runtimes: Vec<f64>) -> RaceOutcome {
        let ids = manager.contender_ids().to_vec();
        let n = ids.len();
        RaceOutcome {
            ids,
            cores: (0..n).collect(),
            objectives: vec![1.0; n],
            runtimes,
            wall_runtimes: vec![1.0; n],
            statuses: vec![SlotStatus::FinishedOk; n],
            interims: vec![Vec::new(); n],
            first_finisher: Some(0),
        }
    }

    #[test]
    fn pool_size_is_invariant_under_processing() {
        let mut manager = manager(50, false);
        for round in 0..20 {
            let o = outcome(&manager, vec![1.0, 2.0, 3.0, 4.0]);
            manager.process(&o, "instance", round);
            assert!(manager.pool().len() == 10);
            assert!(manager.scores().len() == 10);
            for config in manager.pool().iter() {
                assert!(manager.scores().contains_key(&config.id()));
            }
            assert!(manager.contender_ids().len() == 4);
        }
    }

    #[test]
    fn default_survives_every_replacement_pass() {
        let mut manager = manager(50, true);
        let default = manager.default_id.expect("pws default");
        for round in 0..20 {
            let o = outcome(&manager, vec![4.0, 3.0, 2.0, 1.0]);
            manager.process(&o, "instance", round);
            assert!(manager.pool().iter().any(|c| c.id() == default));
        }
    }

    #[test]
    fn zero_chance_replaces_strictly_via_crossover() {
        // drive sigmas low enough that replacements actually fire
        let mut manager = manager(0, false);
        let before = manager
            .pool()
            .iter()
            .map(Configuration::id)
            .collect::<Vec<_>>();
        for round in 0..30 {
            let o = outcome(&manager, vec![1.0, 2.0, 3.0, 4.0]);
            manager.process(&o, "instance", round);
        }
        let after = manager
            .pool()
            .iter()
            .map(Configuration::id)
            .collect::<Vec<_>>();
        assert!(after.iter().any(|id| !before.contains(id)));
        assert!(manager.pool().len() == 10);
        // crossover children only combine values present in the space
        for config in manager.pool().iter() {
            assert!(config.get("level").is_some());
            assert!(config.get("rate").is_some());
        }
    }

    #[test]
    fn select_keeps_the_top_by_mu() {
        let mut manager = manager(50, false);
        let o = outcome(&manager, vec![1.0, 2.0, 3.0, 4.0]);
        manager.process(&o, "instance", 0);
        let best = manager.by_ascending_mu();
        let kept = &best[best.len() - 2..];
        for id in kept {
            assert!(manager.contender_ids().contains(id));
        }
    }

    #[test]
    fn winnerless_race_leaves_scores_untouched() {
        let mut manager = manager(50, false);
        let ids = manager.contender_ids().to_vec();
        let o = RaceOutcome {
            ids: ids.clone(),
            cores: (0..4).collect(),
            objectives: vec![crate::HUGE; 4],
            runtimes: vec![300.0; 4],
            wall_runtimes: vec![300.0; 4],
            statuses: vec![SlotStatus::TimeoutKilled; 4],
            interims: vec![Vec::new(); 4],
            first_finisher: None,
        };
        let winner = manager.process(&o, "instance", 0);
        assert!(winner == None);
        for id in ids {
            assert!(manager.scores()[&id] == Score::default());
        }
    }

    #[test]
    fn evolution_is_reproducible_for_a_fixed_seed() {
        let run = || {
            let mut manager = manager(25, false);
            for round in 0..10 {
                let o = outcome(&manager, vec![1.0, 2.0, 3.0, 4.0]);
                manager.process(&o, "instance", round);
            }
            manager
                .pool()
                .iter()
                .map(|c| c.params().clone())
                .collect::<Vec<_>>()
        };
        assert!(run() == run());
    }

    #[test]
    fn restore_round_trips_through_snapshots() {
        let mut manager = manager(50, false);
        let o = outcome(&manager, vec![1.0, 2.0, 3.0, 4.0]);
        manager.process(&o, "instance", 0);
        let pool = manager.pool().clone();
        let scores = manager.scores().clone();
        let ids = manager.contender_ids().to_vec();
        let mut other = self::manager(50, false);
        other.restore(pool.clone(), scores.clone(), ids.clone());
        assert!(other.pool() == &pool);
        assert!(other.scores() == &scores);
        assert!(other.contender_ids() == ids.as_slice());
    }
}
