mod command;

pub use command::*;

use crate::space::Configuration;

/// declared direction of one interim dimension: does a smaller value mean
/// the target is doing better, or a larger one
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterimMeaning {
    Increase,
    Decrease,
}

/// one parsed event from a target's standard output
#[derive(Debug, Clone, PartialEq)]
pub enum TargetEvent {
    Interim(Vec<f64>),
    Final { objective: f64, runtime: f64 },
}

/// seam to the target algorithm: translate a configuration into a command
/// line and parse the target's stdout back into events
pub trait Wrapper: Send + Sync {
    fn name(&self) -> &str;
    fn translate_config(&self, instance: &str, config: &Configuration) -> Vec<String>;
    fn parse_line(&self, line: &str) -> Option<TargetEvent>;
    fn interim_info(&self) -> Vec<InterimMeaning> {
        Vec::new()
    }
}

/// seam to the instance-feature generator used by the bandit ranker and
/// the gray-box predictor
pub trait FeatureGen: Send + Sync {
    fn features(&self, instance: &str) -> Vec<f64>;
}

/// features from cheap file statistics; a stand-in when no domain-specific
/// generator is wired up
pub struct FileFeatures;

impl FeatureGen for FileFeatures {
    fn features(&self, instance: &str) -> Vec<f64> {
        let content = std::fs::read(instance).unwrap_or_default();
        let lines = content.iter().filter(|&&b| b == b'\n').count();
        let spaces = content.iter().filter(|&&b| b == b' ').count();
        vec![
            content.len() as f64,
            lines as f64,
            spaces as f64,
            if lines > 0 {
                content.len() as f64 / lines as f64
            } else {
                0.0
            },
        ]
    }
}

/// no features; valid only for methods that never ask for them
pub struct NoFeatures;

impl FeatureGen for NoFeatures {
    fn features(&self, _: &str) -> Vec<f64> {
        Vec::new()
    }
}
