//! Harvested module schema: variables, outputs and release provenance.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::module_ref::ModuleReference;

/// Value kind of a variable, classified from its type expression.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Number,
    Bool,
    /// `list(...)`, `set(...)` and `tuple(...)`
    List,
    Map,
    Object,
    /// Untyped or `any`: accepts every value
    Any,
}

impl VariableType {
    /// Classify a type expression such as `list(string)` by its outer keyword.
    ///
    /// Returns `None` for unknown keywords.
    pub fn from_expr(expr: &str) -> Option<Self> {
        let head = expr
            .trim()
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or("");
        match head {
            "string" => Some(VariableType::String),
            "number" => Some(VariableType::Number),
            "bool" => Some(VariableType::Bool),
            "list" | "set" | "tuple" => Some(VariableType::List),
            "map" => Some(VariableType::Map),
            "object" => Some(VariableType::Object),
            "any" => Some(VariableType::Any),
            _ => None,
        }
    }

    /// Whether a literal value is acceptable for this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (VariableType::Any, _) => true,
            (VariableType::String, Value::String(_)) => true,
            (VariableType::Number, Value::Number(_)) => true,
            (VariableType::Bool, Value::Bool(_)) => true,
            (VariableType::List, Value::Array(_)) => true,
            (VariableType::Map | VariableType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VariableType::String => "string",
            VariableType::Number => "number",
            VariableType::Bool => "bool",
            VariableType::List => "list",
            VariableType::Map => "map",
            VariableType::Object => "object",
            VariableType::Any => "any",
        }
    }
}

impl std::fmt::Display for VariableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Short name of a literal value's kind, for diagnostics.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// One input variable of a module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableSpec {
    /// Unique within a schema
    pub name: String,
    pub var_type: VariableType,
    /// Type expression exactly as declared; `None` when the module declares no type
    pub type_expr: Option<String>,
    /// No default declared
    pub required: bool,
    /// Declared default; `Some(Value::Null)` for `default = null`
    pub default: Option<Value>,
    pub description: Option<String>,
    pub sensitive: bool,
}

impl VariableSpec {
    /// A variable with a plain type keyword and no default.
    pub fn required(name: &str, var_type: VariableType) -> Self {
        Self {
            name: name.to_string(),
            var_type,
            type_expr: Some(var_type.name().to_string()),
            required: true,
            default: None,
            description: None,
            sensitive: false,
        }
    }

    /// A variable with a plain type keyword and a default.
    pub fn optional(name: &str, var_type: VariableType, default: Value) -> Self {
        Self {
            default: Some(default),
            required: false,
            ..Self::required(name, var_type)
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// One output of a module. Outputs carry no declared type in the module
/// language, so `value_type` is `Any` unless a source reports one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputSpec {
    pub name: String,
    pub value_type: VariableType,
    pub description: Option<String>,
    pub sensitive: bool,
}

impl OutputSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value_type: VariableType::Any,
            description: None,
            sensitive: false,
        }
    }
}

/// Branch a release tag was cut from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceBranch {
    Develop,
    Main,
}

impl SourceBranch {
    pub fn name(&self) -> &'static str {
        match self {
            SourceBranch::Develop => "develop",
            SourceBranch::Main => "main",
        }
    }
}

impl std::fmt::Display for SourceBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which release tag, cut from which branch, the schema was read from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseProvenance {
    pub tag: String,
    pub source_branch: SourceBranch,
}

/// The authoritative variable/output contract of one module version.
///
/// Built once per run by the harvester and never mutated afterwards. The
/// name-set of `variables` is exactly the set permitted in synthesized
/// output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleSchema {
    pub module: ModuleReference,
    pub version: String,
    /// Registry source address, e.g. `app.terraform.io/Lennar/lambda/aws`
    pub source_address: String,
    pub provenance: ReleaseProvenance,
    /// In declaration order; names unique
    pub variables: Vec<VariableSpec>,
    /// In declaration order; names unique
    pub outputs: Vec<OutputSpec>,
    /// Root README of the selected branch, truncated
    pub documentation: Option<String>,
}

impl ModuleSchema {
    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn variable_names(&self) -> BTreeSet<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn output_names(&self) -> BTreeSet<&str> {
        self.outputs.iter().map(|o| o.name.as_str()).collect()
    }

    /// Variables that need a value in every environment.
    pub fn required_variables(&self) -> impl Iterator<Item = &VariableSpec> {
        self.variables.iter().filter(|v| v.required)
    }
}
