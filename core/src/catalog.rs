//! Resource catalog: the static table of Marketing API operations.
//!
//! # Design
//! The catalog is data, not code. `catalog/marketing.json` is compiled into
//! the binary and parsed once; the dispatcher works generically over the
//! `Operation` records, so adding an endpoint means adding a JSON entry.
//!
//! Path templates use `{name}` placeholders. `{id}` is the entity key taken
//! from `--id`; every other placeholder is filled from the parameters or the
//! configured defaults.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::http::HttpMethod;
use crate::params::ParamKind;

const BUILTIN: &str = include_str!("../catalog/marketing.json");

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub about: String,
    pub operations: Vec<Operation>,
}

/// One callable endpoint. Immutable once loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    pub name: String,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub about: String,
    /// Query pairs sent ahead of any caller parameters, e.g. `q=search`.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Creations answer with the new key in `x-restli-id`.
    #[serde(default)]
    pub returns_id: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default)]
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
}

impl Catalog {
    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Catalog(format!("invalid catalog: {e}")))
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|resource| resource.name == name)
    }

    pub fn operation(&self, resource: &str, operation: &str) -> Result<&Operation> {
        let found = self
            .resource(resource)
            .ok_or_else(|| Error::Catalog(format!("unknown resource {resource}")))?;
        found.operation(operation).ok_or_else(|| {
            Error::Catalog(format!(
                "unknown operation {operation} for {resource} (available: {})",
                found.operation_names().join(", ")
            ))
        })
    }
}

impl Resource {
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|operation| operation.name == name)
    }

    pub fn operation_names(&self) -> Vec<&str> {
        self.operations.iter().map(|operation| operation.name.as_str()).collect()
    }
}

impl Operation {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|spec| spec.name == name)
    }

    /// Placeholder names in the path template, in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            names.push(&rest[start + 1..start + len]);
            rest = &rest[start + len + 1..];
        }
        names
    }

    pub fn needs_id(&self) -> bool {
        self.placeholders().contains(&"id")
    }

    /// Substitute placeholders with already-encoded values.
    ///
    /// `lookup` is asked for each placeholder; a placeholder with no value is
    /// a `Catalog` error naming it.
    pub fn render_path(&self, mut lookup: impl FnMut(&str) -> Option<String>) -> Result<String> {
        let mut path = self.path.clone();
        for name in self.placeholders() {
            let value = lookup(name).ok_or_else(|| {
                if name == "id" {
                    Error::Catalog(format!("{} requires --id", self.name))
                } else {
                    Error::Catalog(format!("{} requires a value for {{{name}}}", self.name))
                }
            })?;
            path = path.replacen(&format!("{{{name}}}"), &value, 1);
        }
        Ok(path)
    }
}
