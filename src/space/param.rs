use rand::Rng;
use rand::seq::IndexedRandom;
use serde::Deserialize;
use serde::Serialize;

/// how a continuous parameter is drawn when sampled randomly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    Uniform,
    Normal,
}

/// one typed parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// the domain one parameter ranges over; bounds are inclusive on both ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Domain {
    Discrete {
        min: i64,
        max: i64,
        log: bool,
    },
    Continuous {
        min: f64,
        max: f64,
        log: bool,
        distribution: Distribution,
    },
    Categorical {
        choices: Vec<String>,
    },
    Binary,
}

/// gate tying a parameter to enabling values of a parent parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub parent: String,
    pub enables: Vec<ParamValue>,
}

/// one entry of the configuration space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub domain: Domain,
    pub default: ParamValue,
    pub condition: Option<Condition>,
}

impl Domain {
    /// draw one value; log-scaled domains sample uniformly in log space
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParamValue {
        match self {
            Self::Discrete { min, max, log } => {
                assert!(min < max, "invalid discrete bounds");
                if *log {
                    assert!(*min > 0, "log scale requires positive bounds");
                    let x = rng
                        .random_range((*min as f64).ln()..=(*max as f64).ln())
                        .exp()
                        .round() as i64;
                    ParamValue::Int(x.clamp(*min, *max))
                } else {
                    ParamValue::Int(rng.random_range(*min..=*max))
                }
            }
            Self::Continuous {
                min,
                max,
                log,
                distribution,
            } => {
                assert!(min < max, "invalid continuous bounds");
                let (lo, hi) = if *log {
                    assert!(*min > 0.0, "log scale requires positive bounds");
                    (min.ln(), max.ln())
                } else {
                    (*min, *max)
                };
                let x = match distribution {
                    Distribution::Uniform => rng.random_range(lo..=hi),
                    Distribution::Normal => {
                        gaussian(rng, (lo + hi) / 2.0, (hi - lo) / 6.0).clamp(lo, hi)
                    }
                };
                let x = if *log { x.exp().clamp(*min, *max) } else { x };
                ParamValue::Float(x)
            }
            Self::Categorical { choices } => {
                let choice = choices.choose(rng).expect("nonempty choices");
                ParamValue::Text(choice.clone())
            }
            Self::Binary => ParamValue::Bool(rng.random_bool(0.5)),
        }
    }

    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (Self::Discrete { min, max, .. }, ParamValue::Int(i)) => (min..=max).contains(&i),
            (Self::Continuous { min, max, .. }, ParamValue::Float(x)) => (min..=max).contains(&x),
            (Self::Categorical { choices }, ParamValue::Text(s)) => choices.contains(s),
            (Self::Binary, ParamValue::Bool(_)) => true,
            _ => false,
        }
    }
}

fn gaussian<R: Rng>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    let u = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let v = rng.random::<f64>();
    mean + sd * (-2.0 * u.ln()).sqrt() * (std::f64::consts::TAU * v).cos()
}
