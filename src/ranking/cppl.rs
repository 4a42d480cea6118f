use crate::space::ConfigId;
use crate::space::ConfigSpace;
use crate::space::Configuration;
use crate::wrapper::FeatureGen;
use std::collections::BTreeMap;
use std::sync::Arc;

/// contextual preselection bandit over the contender pool. parameter
/// vectors and instance features are joined through a degree-2
/// interaction map; the preference weights follow the winner's
/// plackett-luce gradient, and contenders are picked by upper confidence
/// bound on the averaged weights.
pub struct Cppl {
    space: Arc<ConfigSpace>,
    feature_gen: Arc<dyn FeatureGen>,
    omega: f64,
    gamma: f64,
    alpha: f64,
    t: usize,
    theta_hat: Vec<f64>,
    theta_bar: Vec<f64>,
    descriptors: BTreeMap<ConfigId, Vec<f64>>,
    joined: BTreeMap<ConfigId, Vec<f64>>,
    instance_features: Vec<f64>,
    feature_mean: Vec<f64>,
    feature_m2: Vec<f64>,
    observed: usize,
}

impl Cppl {
    pub fn new(
        space: Arc<ConfigSpace>,
        feature_gen: Arc<dyn FeatureGen>,
        omega: f64,
        gamma: f64,
        alpha: f64,
    ) -> Self {
        Self {
            space,
            feature_gen,
            omega,
            gamma,
            alpha,
            t: 0,
            theta_hat: Vec::new(),
            theta_bar: Vec::new(),
            descriptors: BTreeMap::new(),
            joined: BTreeMap::new(),
            instance_features: Vec::new(),
            feature_mean: Vec::new(),
            feature_m2: Vec::new(),
            observed: 0,
        }
    }

    pub fn register(&mut self, config: &Configuration) {
        let descriptor = self.space.vectorize(config);
        if !self.instance_features.is_empty() {
            self.joined
                .insert(config.id(), join(&self.instance_features, &descriptor));
        }
        self.descriptors.insert(config.id(), descriptor);
    }

    pub fn forget(&mut self, id: ConfigId) {
        self.descriptors.remove(&id);
        self.joined.remove(&id);
    }

    /// fold a fresh instance into the running standardization and rebuild
    /// the joined vectors of every known configuration
    pub fn observe_instance(&mut self, instance: &str) {
        let raw = self.feature_gen.features(instance);
        if raw.is_empty() {
            return;
        }
        if self.feature_mean.is_empty() {
            self.feature_mean = vec![0.0; raw.len()];
            self.feature_m2 = vec![0.0; raw.len()];
        }
        self.observed += 1;
        for (i, &x) in raw.iter().enumerate() {
            let delta = x - self.feature_mean[i];
            self.feature_mean[i] += delta / self.observed as f64;
            self.feature_m2[i] += delta * (x - self.feature_mean[i]);
        }
        self.instance_features = raw
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let var = self.feature_m2[i] / self.observed.max(1) as f64;
                if var > f64::MIN_POSITIVE {
                    (x - self.feature_mean[i]) / var.sqrt()
                } else {
                    0.0
                }
            })
            .collect();
        let features = self.instance_features.clone();
        for (id, descriptor) in self.descriptors.iter() {
            self.joined.insert(*id, join(&features, descriptor));
        }
    }

    /// stochastic gradient step on the plackett-luce log likelihood of the
    /// observed winner among the race participants
    pub fn update(&mut self, winner: ConfigId, participants: &[ConfigId]) {
        let Some(winning) = self.vector(winner) else {
            return;
        };
        self.t += 1;
        if self.theta_hat.is_empty() {
            self.theta_hat = vec![0.0; winning.len()];
            self.theta_bar = vec![0.0; winning.len()];
        }
        let vectors = participants
            .iter()
            .filter_map(|id| self.vector(*id))
            .collect::<Vec<_>>();
        let weights = vectors
            .iter()
            .map(|x| dot(&self.theta_hat, x).min(50.0).exp())
            .collect::<Vec<_>>();
        let total = weights.iter().sum::<f64>().max(f64::MIN_POSITIVE);
        let step = self.gamma * (self.t as f64).powf(-self.alpha);
        for d in 0..self.theta_hat.len() {
            let expected = vectors
                .iter()
                .zip(weights.iter())
                .map(|(x, w)| w / total * x[d])
                .sum::<f64>();
            self.theta_hat[d] += step * (winning[d] - expected);
        }
        let t = self.t as f64;
        for d in 0..self.theta_bar.len() {
            self.theta_bar[d] = (t - 1.0) * self.theta_bar[d] / t + self.theta_hat[d] / t;
        }
    }

    fn vector(&self, id: ConfigId) -> Option<Vec<f64>> {
        self.joined
            .get(&id)
            .cloned()
            .or_else(|| self.descriptors.get(&id).map(|d| join(&[], d)))
    }

    /// averaged-weight score with an exploration bonus that decays in t
    pub fn ucb(&self, id: ConfigId) -> f64 {
        let Some(x) = self.vector(id) else {
            return 0.0;
        };
        if self.theta_bar.is_empty() || self.t == 0 {
            return 0.0;
        }
        let norm = dot(&x, &x).sqrt();
        let t = self.t as f64;
        dot(&self.theta_bar, &x) + self.omega * (2.0 * t.ln() / t).sqrt() * norm
    }

    /// the c most promising configurations by upper confidence bound
    pub fn select(&self, ids: &[ConfigId], c: usize) -> Vec<ConfigId> {
        let mut ordered = ids.to_vec();
        ordered.sort_by(|a, b| {
            self.ucb(*b)
                .partial_cmp(&self.ucb(*a))
                .expect("comparable bounds")
        });
        ordered.truncate(c);
        ordered
    }

    /// configurations scoring below the median bound, candidates for
    /// replacement
    pub fn discards(&self, ids: &[ConfigId]) -> Vec<ConfigId> {
        if self.t == 0 || ids.len() < 2 {
            return Vec::new();
        }
        let mut bounds = ids.iter().map(|id| self.ucb(*id)).collect::<Vec<_>>();
        bounds.sort_by(|a, b| a.partial_cmp(b).expect("comparable bounds"));
        let median = bounds[ids.len() / 2];
        ids.iter()
            .filter(|id| self.ucb(**id) < median)
            .cloned()
            .collect()
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// degree-2 interaction-only feature map over the concatenated instance
/// and parameter vectors, with a leading bias term
fn join(instance: &[f64], params: &[f64]) -> Vec<f64> {
    let z = instance
        .iter()
        .chain(params.iter())
        .cloned()
        .collect::<Vec<_>>();
    let mut out = Vec::with_capacity(1 + z.len() + z.len() * (z.len() - 1) / 2);
    out.push(1.0);
    out.extend(z.iter());
    for i in 0..z.len() {
        for j in i + 1..z.len() {
            out.push(z[i] * z[j]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Distribution;
    use crate::space::Domain;
    use crate::space::ParamDef;
    use crate::space::ParamValue;
    use crate::wrapper::NoFeatures;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn space() -> Arc<ConfigSpace> {
        Arc::new(
            ConfigSpace::new(vec![(
                "weight".into(),
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

    fn bandit() -> Cppl {
        Cppl::new(space(), Arc::new(NoFeatures), 0.001, 1.0, 0.2)
    }

    fn weighted(w: f64) -> Configuration {
        let mut params = std::collections::BTreeMap::new();
        params.insert("weight".to_string(), ParamValue::Float(w));
        Configuration::new(params)
    }

    #[test]
    fn repeated_wins_raise_the_winners_bound() {
        let mut cppl = bandit();
        let configs = [weighted(0.9), weighted(0.1), weighted(0.2), weighted(0.3)];
        let ids = configs.iter().map(|c| c.id()).collect::<Vec<_>>();
        for config in configs.iter() {
            cppl.register(config);
        }
        for _ in 0..50 {
            cppl.update(ids[0], &ids);
        }
        let best = cppl.select(&ids, 1);
        assert!(best == vec![ids[0]]);
    }

    #[test]
    fn select_returns_distinct_ids() {
        let space = space();
        let ref mut rng = SmallRng::seed_from_u64(11);
        let mut cppl = bandit();
        let configs = (0..6)
            .map(|_| space.sample_random(rng))
            .collect::<Vec<_>>();
        let ids = configs.iter().map(|c| c.id()).collect::<Vec<_>>();
        for config in configs.iter() {
            cppl.register(config);
        }
        let picked = cppl.select(&ids, 4);
        assert!(picked.len() == 4);
        let mut unique = picked.clone();
        unique.sort();
        unique.dedup();
        assert!(unique.len() == 4);
    }

    #[test]
    fn discards_sit_below_the_median() {
        let mut cppl = bandit();
        let configs = [
            weighted(0.9),
            weighted(0.1),
            weighted(0.2),
            weighted(0.3),
            weighted(0.4),
        ];
        let ids = configs.iter().map(|c| c.id()).collect::<Vec<_>>();
        for config in configs.iter() {
            cppl.register(config);
        }
        for _ in 0..20 {
            cppl.update(ids[0], &ids);
        }
        let discards = cppl.discards(&ids);
        assert!(!discards.contains(&ids[0]));
        assert!(discards.len() < ids.len());
    }
}
