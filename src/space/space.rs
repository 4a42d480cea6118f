use super::*;
use rand::Rng;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum SpaceError {
    #[error("parameter {0} has inconsistent bounds")]
    InvalidBounds(String),
    #[error("parameter {0} has an empty choice list")]
    EmptyChoices(String),
    #[error("parameter {0} has a default outside its domain")]
    DefaultOutOfDomain(String),
    #[error("parameter {child} is conditioned on unknown parameter {parent}")]
    UnknownParent { child: String, parent: String },
    #[error("parameter conditions form a cycle")]
    CyclicCondition,
    #[error("parameter {name} has unknown paramtype {kind}")]
    UnknownParamType { name: String, kind: String },
    #[error("unreadable parameter file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed parameter file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed pcs line: {0}")]
    Pcs(String),
}

/// the typed parameter space plus its conditional dag; sampling walks the
/// dag in topological order and omits disabled parameters
#[derive(Debug, Clone)]
pub struct ConfigSpace {
    params: Vec<(String, ParamDef)>,
    topo: Vec<usize>,
}

impl ConfigSpace {
    pub fn new(params: Vec<(String, ParamDef)>) -> Result<Self, SpaceError> {
        for (name, def) in params.iter() {
            match &def.domain {
                Domain::Discrete { min, max, .. } if min >= max => {
                    return Err(SpaceError::InvalidBounds(name.clone()));
                }
                Domain::Continuous { min, max, .. } if min >= max => {
                    return Err(SpaceError::InvalidBounds(name.clone()));
                }
                Domain::Categorical { choices } if choices.is_empty() => {
                    return Err(SpaceError::EmptyChoices(name.clone()));
                }
                _ => {}
            }
            if !def.domain.contains(&def.default) {
                return Err(SpaceError::DefaultOutOfDomain(name.clone()));
            }
        }
        let topo = Self::toposort(&params)?;
        Ok(Self { params, topo })
    }

    /// kahn pass over the condition edges
    fn toposort(params: &[(String, ParamDef)]) -> Result<Vec<usize>, SpaceError> {
        let index = params
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.as_str(), i))
            .collect::<BTreeMap<_, _>>();
        let mut children = vec![Vec::new(); params.len()];
        let mut indegree = vec![0usize; params.len()];
        for (i, (name, def)) in params.iter().enumerate() {
            if let Some(cond) = &def.condition {
                let parent =
                    *index
                        .get(cond.parent.as_str())
                        .ok_or_else(|| SpaceError::UnknownParent {
                            child: name.clone(),
                            parent: cond.parent.clone(),
                        })?;
                children[parent].push(i);
                indegree[i] += 1;
            }
        }
        let mut ready = (0..params.len())
            .filter(|&i| indegree[i] == 0)
            .collect::<Vec<_>>();
        let mut order = Vec::with_capacity(params.len());
        while let Some(i) = ready.pop() {
            order.push(i);
            for &child in children[i].iter() {
                indegree[child] -= 1;
                if indegree[child] == 0 {
                    ready.push(child);
                }
            }
        }
        if order.len() == params.len() {
            Ok(order)
        } else {
            Err(SpaceError::CyclicCondition)
        }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &(String, ParamDef)> {
        self.params.iter()
    }
    pub fn get(&self, name: &str) -> Option<&ParamDef> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
    }

    fn enabled(def: &ParamDef, chosen: &BTreeMap<String, ParamValue>) -> bool {
        match &def.condition {
            None => true,
            Some(cond) => chosen
                .get(&cond.parent)
                .map(|v| cond.enables.contains(v))
                .unwrap_or(false),
        }
    }

    /// walk the dag in topological order, assigning values to enabled
    /// parameters via the given picker
    fn assemble<F>(&self, mut pick: F) -> Configuration
    where
        F: FnMut(&str, &ParamDef) -> ParamValue,
    {
        let mut chosen = BTreeMap::new();
        for &i in self.topo.iter() {
            let (name, def) = &self.params[i];
            if Self::enabled(def, &chosen) {
                chosen.insert(name.clone(), pick(name, def));
            }
        }
        Configuration::new(chosen)
    }

    /// the default configuration
    pub fn sample_default(&self) -> Configuration {
        self.assemble(|_, def| def.default.clone())
    }

    /// an independent per-parameter random draw
    pub fn sample_random<R: Rng>(&self, rng: &mut R) -> Configuration {
        self.assemble(|_, def| def.domain.sample(rng))
    }

    /// uniform per-parameter recombination of two parents
    pub fn crossover<R: Rng>(
        &self,
        a: &Configuration,
        b: &Configuration,
        rng: &mut R,
    ) -> Configuration {
        self.assemble(|name, def| {
            let (first, second) = if rng.random::<f64>() > 0.5 {
                (a, b)
            } else {
                (b, a)
            };
            first
                .get(name)
                .or_else(|| second.get(name))
                .cloned()
                .unwrap_or_else(|| def.domain.sample(rng))
        })
    }

    /// per-parameter resampling with the given percent chance
    pub fn mutate<R: Rng>(
        &self,
        config: &Configuration,
        rate_pct: u32,
        rng: &mut R,
    ) -> Configuration {
        self.assemble(|name, def| {
            if rng.random_range(0..100) < rate_pct {
                def.domain.sample(rng)
            } else {
                config
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| def.domain.sample(rng))
            }
        })
    }

    /// crossover of two parents where mutated genes are pulled from one
    /// shared donor, so every mutation within a call is consistent
    pub fn recombine<R: Rng>(
        &self,
        a: &Configuration,
        b: &Configuration,
        donor: &Configuration,
        mutate_pct: u32,
        rng: &mut R,
    ) -> Configuration {
        self.assemble(|name, def| {
            let (first, second) = if rng.random::<f64>() > 0.5 {
                (a, b)
            } else {
                (b, a)
            };
            let inherited = first.get(name).or_else(|| second.get(name));
            let value = if rng.random_range(0..100u32) <= mutate_pct {
                donor.get(name).or(inherited)
            } else {
                inherited
            };
            value
                .cloned()
                .unwrap_or_else(|| def.domain.sample(rng))
        })
    }

    /// fixed-length numeric embedding: min-max scaled numerics, 0/1
    /// binaries, one-hot categoricals; disabled parameters fall back to the
    /// scaled default
    pub fn vectorize(&self, config: &Configuration) -> Vec<f64> {
        let mut out = Vec::new();
        for (name, def) in self.params.iter() {
            let value = config.get(name).unwrap_or(&def.default);
            match &def.domain {
                Domain::Discrete { min, max, .. } => {
                    let x = match value {
                        ParamValue::Int(i) => *i as f64,
                        _ => 0.0,
                    };
                    out.push((x - *min as f64) / (*max as f64 - *min as f64));
                }
                Domain::Continuous { min, max, .. } => {
                    let x = match value {
                        ParamValue::Float(x) => *x,
                        _ => 0.0,
                    };
                    out.push((x - min) / (max - min));
                }
                Domain::Categorical { choices } => {
                    for choice in choices.iter() {
                        let hit = matches!(value, ParamValue::Text(s) if s == choice);
                        out.push(if hit { 1.0 } else { 0.0 });
                    }
                }
                Domain::Binary => {
                    let hit = matches!(value, ParamValue::Bool(true));
                    out.push(if hit { 1.0 } else { 0.0 });
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn space() -> ConfigSpace {
        ConfigSpace::new(vec![
            (
                "restarts".into(),
                ParamDef {
                    domain: Domain::Discrete {
                        min: 1,
                        max: 100,
                        log: false,
                    },
                    default: ParamValue::Int(10),
                    condition: None,
                },
            ),
            (
                "decay".into(),
                ParamDef {
                    domain: Domain::Continuous {
                        min: 0.5,
                        max: 0.999,
                        log: false,
                        distribution: Distribution::Uniform,
                    },
                    default: ParamValue::Float(0.95),
                    condition: None,
                },
            ),
            (
                "heuristic".into(),
                ParamDef {
                    domain: Domain::Categorical {
                        choices: vec!["vsids".into(), "lrb".into()],
                    },
                    default: ParamValue::Text("vsids".into()),
                    condition: None,
                },
            ),
            (
                "lrb_step".into(),
                ParamDef {
                    domain: Domain::Continuous {
                        min: 0.01,
                        max: 0.1,
                        log: false,
                        distribution: Distribution::Uniform,
                    },
                    default: ParamValue::Float(0.05),
                    condition: Some(Condition {
                        parent: "heuristic".into(),
                        enables: vec![ParamValue::Text("lrb".into())],
                    }),
                },
            ),
        ])
        .expect("valid space")
    }

    #[test]
    fn default_omits_disabled_parameters() {
        let config = space().sample_default();
        assert!(config.get("restarts") == Some(&ParamValue::Int(10)));
        assert!(config.get("lrb_step") == None);
    }

    #[test]
    fn random_includes_conditionals_iff_enabled() {
        let space = space();
        let ref mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..100 {
            let config = space.sample_random(rng);
            let lrb = config.get("heuristic") == Some(&ParamValue::Text("lrb".into()));
            assert!(config.get("lrb_step").is_some() == lrb);
        }
    }

    #[test]
    fn crossover_mixes_parent_values() {
        let space = space();
        let ref mut rng = SmallRng::seed_from_u64(3);
        let a = space.sample_random(rng);
        let b = space.sample_random(rng);
        for _ in 0..20 {
            let child = space.crossover(&a, &b, rng);
            let x = child.get("restarts").expect("unconditional parameter");
            assert!(Some(x) == a.get("restarts") || Some(x) == b.get("restarts"));
        }
    }

    #[test]
    fn mutate_with_zero_rate_is_identity_on_values() {
        let space = space();
        let ref mut rng = SmallRng::seed_from_u64(3);
        let config = space.sample_random(rng);
        let copy = space.mutate(&config, 0, rng);
        assert!(copy.params() == config.params());
        assert!(copy.id() != config.id());
    }

    #[test]
    fn recombine_with_full_mutation_copies_the_donor() {
        let space = space();
        let ref mut rng = SmallRng::seed_from_u64(3);
        let a = space.sample_default();
        let b = space.sample_default();
        let donor = space.sample_random(rng);
        let child = space.recombine(&a, &b, &donor, 100, rng);
        for (name, value) in child.params() {
            if let Some(donated) = donor.get(name) {
                assert!(value == donated);
            }
        }
    }

    #[test]
    fn cyclic_conditions_are_rejected() {
        let def = |parent: &str| ParamDef {
            domain: Domain::Binary,
            default: ParamValue::Bool(false),
            condition: Some(Condition {
                parent: parent.into(),
                enables: vec![ParamValue::Bool(true)],
            }),
        };
        let result = ConfigSpace::new(vec![("a".into(), def("b")), ("b".into(), def("a"))]);
        assert!(matches!(result, Err(SpaceError::CyclicCondition)));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let result = ConfigSpace::new(vec![(
            "broken".into(),
            ParamDef {
                domain: Domain::Discrete {
                    min: 9,
                    max: 3,
                    log: false,
                },
                default: ParamValue::Int(5),
                condition: None,
            },
        )]);
        assert!(matches!(result, Err(SpaceError::InvalidBounds(_))));
    }

    #[test]
    fn vectorize_is_fixed_length() {
        let space = space();
        let ref mut rng = SmallRng::seed_from_u64(3);
        let n = space.vectorize(&space.sample_default()).len();
        for _ in 0..20 {
            assert!(space.vectorize(&space.sample_random(rng)).len() == n);
        }
    }
}
