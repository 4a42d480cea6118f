use super::*;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// opaque identity of a configuration; a new configuration is a new id
pub type ConfigId = uuid::Uuid;

/// an immutable assignment of values to the enabled parameters of a space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    id: ConfigId,
    params: BTreeMap<String, ParamValue>,
}

impl Configuration {
    pub fn new(params: BTreeMap<String, ParamValue>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            params,
        }
    }
    pub fn id(&self) -> ConfigId {
        self.id
    }
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }
    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }
}

impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{{", self.id.simple())?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, "}}")
    }
}
