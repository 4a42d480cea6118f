use super::*;
use crate::space::Configuration;
use serde::Deserialize;
use std::path::Path;

/// generic command-line wrapper: the target is a program invoked as
/// `program [args..] instance [--name value]..` and speaks a line protocol
/// on stdout:
///
/// ```text
/// interim <v1> <v2> ..
/// result <objective> <runtime>
/// ```
///
/// the definition is loaded from a small json file:
///
/// ```json
/// { "name": "cadical", "program": "./cadical_wrapped", "args": ["--quiet"],
///   "interim": ["decrease", "increase"] }
/// ```
pub struct CommandWrapper {
    name: String,
    program: String,
    args: Vec<String>,
    interim: Vec<InterimMeaning>,
}

#[derive(Deserialize)]
struct WrapperSpec {
    name: String,
    program: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    interim: Vec<InterimMeaning>,
}

impl CommandWrapper {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let spec: WrapperSpec = serde_json::from_str(&text)?;
        Ok(Self {
            name: spec.name,
            program: spec.program,
            args: spec.args,
            interim: spec.interim,
        })
    }

    /// shell-script wrapper for tests and demos: the instance text is the
    /// script body
    pub fn script(program: &str) -> Self {
        Self {
            name: program.to_string(),
            program: program.to_string(),
            args: vec!["-c".to_string()],
            interim: Vec::new(),
        }
    }

    pub fn with_interim(mut self, interim: Vec<InterimMeaning>) -> Self {
        self.interim = interim;
        self
    }
}

impl Wrapper for CommandWrapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn translate_config(&self, instance: &str, config: &Configuration) -> Vec<String> {
        let mut argv = Vec::with_capacity(2 + self.args.len() + 2 * config.params().len());
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv.push(instance.to_string());
        for (name, value) in config.params() {
            argv.push(format!("--{}", name));
            argv.push(value.to_string());
        }
        argv
    }

    fn parse_line(&self, line: &str) -> Option<TargetEvent> {
        let mut tokens = line.split_whitespace();
        match tokens.next()? {
            "interim" => {
                let values = tokens
                    .map(|t| t.parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .ok()?;
                Some(TargetEvent::Interim(values))
            }
            "result" => {
                let objective = tokens.next()?.parse().ok()?;
                let runtime = tokens.next()?.parse().ok()?;
                Some(TargetEvent::Final { objective, runtime })
            }
            _ => None,
        }
    }

    fn interim_info(&self) -> Vec<InterimMeaning> {
        self.interim.clone()
    }
}
