use crate::space::Condition;
use crate::space::ConfigSpace;
use crate::space::Distribution;
use crate::space::Domain;
use crate::space::ParamDef;
use crate::space::ParamValue;
use crate::space::SpaceError;
use serde::Deserialize;
use std::path::Path;

/// read a configuration space definition, json or pcs-new by extension
pub fn load_space(path: &Path) -> Result<ConfigSpace, SpaceError> {
    let text = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_json(&text),
        _ => parse_pcs(&text),
    }
}

#[derive(Deserialize)]
struct RawParam {
    paramtype: String,
    default: serde_json::Value,
    #[serde(default)]
    minval: Option<serde_json::Value>,
    #[serde(default)]
    maxval: Option<serde_json::Value>,
    #[serde(default)]
    choices: Option<Vec<String>>,
    #[serde(default)]
    distribution: Option<String>,
    #[serde(default)]
    log: Option<bool>,
    #[serde(default)]
    condition: Option<RawCondition>,
}

#[derive(Deserialize)]
struct RawCondition {
    parent: String,
    enables: Vec<serde_json::Value>,
}

/// structured object format: parameter name to definition
pub fn parse_json(text: &str) -> Result<ConfigSpace, SpaceError> {
    let raw: std::collections::BTreeMap<String, RawParam> = serde_json::from_str(text)?;
    let mut params = Vec::with_capacity(raw.len());
    for (name, def) in raw {
        let bad = || SpaceError::InvalidBounds(name.clone());
        let domain = match def.paramtype.as_str() {
            "discrete" => Domain::Discrete {
                min: def.minval.as_ref().and_then(int).ok_or_else(bad)?,
                max: def.maxval.as_ref().and_then(int).ok_or_else(bad)?,
                log: def.log.unwrap_or(false),
            },
            "continuous" => Domain::Continuous {
                min: def.minval.as_ref().and_then(float).ok_or_else(bad)?,
                max: def.maxval.as_ref().and_then(float).ok_or_else(bad)?,
                log: def.log.unwrap_or(false),
                distribution: match def.distribution.as_deref() {
                    None | Some("uniform") => Distribution::Uniform,
                    Some("normal") => Distribution::Normal,
                    Some(other) => {
                        return Err(SpaceError::UnknownParamType {
                            name,
                            kind: other.to_string(),
                        });
                    }
                },
            },
            "categorical" => Domain::Categorical {
                choices: def.choices.ok_or_else(|| SpaceError::EmptyChoices(name.clone()))?,
            },
            "binary" => Domain::Binary,
            other => {
                return Err(SpaceError::UnknownParamType {
                    name,
                    kind: other.to_string(),
                });
            }
        };
        let default = value(&def.default)
            .map(|v| coerce(&domain, v))
            .ok_or_else(|| SpaceError::DefaultOutOfDomain(name.clone()))?;
        let condition = def.condition.map(|c| Condition {
            parent: c.parent,
            enables: c.enables.iter().filter_map(value).collect(),
        });
        params.push((
            name,
            ParamDef {
                domain,
                default,
                condition,
            },
        ));
    }
    finish(params)
}

/// pcs-new text format: one parameter or condition per line
pub fn parse_pcs(text: &str) -> Result<ConfigSpace, SpaceError> {
    let mut params: Vec<(String, ParamDef)> = Vec::new();
    let mut conditions: Vec<(String, String, Vec<String>)> = Vec::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if line.contains('|') {
            conditions.push(parse_pcs_condition(line)?);
            continue;
        }
        let (name, def) = parse_pcs_param(line)?;
        params.push((name, def));
    }
    for (child, parent, enables) in conditions {
        let parent_domain = params
            .iter()
            .find(|(n, _)| *n == parent)
            .map(|(_, d)| d.domain.clone())
            .ok_or_else(|| SpaceError::UnknownParent {
                child: child.clone(),
                parent: parent.clone(),
            })?;
        let entry = params
            .iter_mut()
            .find(|(n, _)| *n == child)
            .ok_or_else(|| SpaceError::Pcs(format!("condition on undeclared {}", child)))?;
        entry.1.condition = Some(Condition {
            parent,
            enables: enables
                .into_iter()
                .map(|t| coerce(&parent_domain, parse_token(&t)))
                .collect(),
        });
    }
    finish(params)
}

fn finish(params: Vec<(String, ParamDef)>) -> Result<ConfigSpace, SpaceError> {
    ConfigSpace::new(params)
}

/// `name integer [1,100] [10] log` and friends
fn parse_pcs_param(line: &str) -> Result<(String, ParamDef), SpaceError> {
    let bad = || SpaceError::Pcs(line.to_string());
    let mut tokens = line.split_whitespace();
    let name = tokens.next().ok_or_else(bad)?.to_string();
    let kind = tokens.next().ok_or_else(bad)?;
    let rest = tokens.collect::<Vec<_>>().join(" ");
    let log = rest.trim_end().ends_with("log");
    match kind {
        "integer" | "real" => {
            let (bounds, default) = brackets(&rest).ok_or_else(bad)?;
            let (lo, hi) = bounds.split_once(',').ok_or_else(bad)?;
            if kind == "integer" {
                Ok((
                    name,
                    ParamDef {
                        domain: Domain::Discrete {
                            min: lo.trim().parse().map_err(|_| bad())?,
                            max: hi.trim().parse().map_err(|_| bad())?,
                            log,
                        },
                        default: ParamValue::Int(default.trim().parse().map_err(|_| bad())?),
                        condition: None,
                    },
                ))
            } else {
                Ok((
                    name,
                    ParamDef {
                        domain: Domain::Continuous {
                            min: lo.trim().parse().map_err(|_| bad())?,
                            max: hi.trim().parse().map_err(|_| bad())?,
                            log,
                            distribution: Distribution::Uniform,
                        },
                        default: ParamValue::Float(default.trim().parse().map_err(|_| bad())?),
                        condition: None,
                    },
                ))
            }
        }
        "categorical" | "ordinal" => {
            let open = rest.find('{').ok_or_else(bad)?;
            let close = rest.find('}').ok_or_else(bad)?;
            let choices = rest[open + 1..close]
                .split(',')
                .map(|c| c.trim().to_string())
                .collect::<Vec<_>>();
            let (default, _) = brackets(&rest[close..]).ok_or_else(bad)?;
            Ok((
                name,
                ParamDef {
                    domain: Domain::Categorical { choices },
                    default: ParamValue::Text(default.trim().to_string()),
                    condition: None,
                },
            ))
        }
        other => Err(SpaceError::UnknownParamType {
            name,
            kind: other.to_string(),
        }),
    }
}

/// `child | parent in {v1, v2}`
fn parse_pcs_condition(line: &str) -> Result<(String, String, Vec<String>), SpaceError> {
    let bad = || SpaceError::Pcs(line.to_string());
    let (child, rest) = line.split_once('|').ok_or_else(bad)?;
    let open = rest.find('{').ok_or_else(bad)?;
    let close = rest.find('}').ok_or_else(bad)?;
    let mut head = rest[..open].split_whitespace();
    let parent = head.next().ok_or_else(bad)?.to_string();
    if head.next() != Some("in") {
        return Err(bad());
    }
    Ok((
        child.trim().to_string(),
        parent,
        rest[open + 1..close]
            .split(',')
            .map(|v| v.trim().to_string())
            .collect(),
    ))
}

/// the first two [..] groups of a pcs tail: bounds and default
fn brackets(rest: &str) -> Option<(String, String)> {
    let mut groups = Vec::new();
    let mut remainder = rest;
    while let Some(open) = remainder.find('[') {
        let close = remainder[open..].find(']')? + open;
        groups.push(remainder[open + 1..close].to_string());
        remainder = &remainder[close + 1..];
        if groups.len() == 2 {
            break;
        }
    }
    match groups.len() {
        2 => {
            let mut it = groups.into_iter();
            Some((it.next()?, it.next()?))
        }
        1 => {
            let mut it = groups.into_iter();
            Some((it.next()?, String::new()))
        }
        _ => None,
    }
}

fn value(v: &serde_json::Value) -> Option<ParamValue> {
    match v {
        serde_json::Value::Bool(b) => Some(ParamValue::Bool(*b)),
        serde_json::Value::Number(n) if n.is_i64() => Some(ParamValue::Int(n.as_i64()?)),
        serde_json::Value::Number(n) => Some(ParamValue::Float(n.as_f64()?)),
        serde_json::Value::String(s) => Some(ParamValue::Text(s.clone())),
        _ => None,
    }
}

fn int(v: &serde_json::Value) -> Option<i64> {
    v.as_i64()
}

fn float(v: &serde_json::Value) -> Option<f64> {
    v.as_f64()
}

fn parse_token(token: &str) -> ParamValue {
    if let Ok(b) = token.parse() {
        ParamValue::Bool(b)
    } else if let Ok(i) = token.parse() {
        ParamValue::Int(i)
    } else if let Ok(x) = token.parse() {
        ParamValue::Float(x)
    } else {
        ParamValue::Text(token.to_string())
    }
}

/// bend a parsed value to the numeric kind its domain expects
fn coerce(domain: &Domain, value: ParamValue) -> ParamValue {
    match (domain, value) {
        (Domain::Continuous { .. }, ParamValue::Int(i)) => ParamValue::Float(i as f64),
        (Domain::Discrete { .. }, ParamValue::Float(x)) => ParamValue::Int(x as i64),
        (Domain::Categorical { .. }, ParamValue::Int(i)) => ParamValue::Text(i.to_string()),
        (Domain::Categorical { .. }, ParamValue::Bool(b)) => ParamValue::Text(b.to_string()),
        (_, v) => v,
    }
}
