//! Merge of the two variable sources.
//!
//! Precedence, highest first:
//! 1. Version-control declarations define the variable set: names, types,
//!    required/default status, in declaration order.
//! 2. The registry's input description is consulted only to detect
//!    disagreement. It never adds, removes or alters a variable.
//!
//! Every difference is returned as a [`SourceDisagreement`] so it shows up
//! in diagnostics instead of being resolved silently.

use modpromote_sources::RegistryInput;
use serde::{Deserialize, Serialize};

use crate::domain::schema::{VariableSpec, VariableType};

/// One observed difference between registry and version control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDisagreement {
    /// Listed by the registry, absent from the declarations; dropped
    RegistryOnly { variable: String },
    /// Declared in version control, not listed by the registry; kept
    VcsOnly { variable: String },
    TypeDiffers {
        variable: String,
        registry: String,
        vcs: String,
    },
    RequiredDiffers {
        variable: String,
        registry: bool,
        vcs: bool,
    },
    /// The registry had no usable input description; the declared set is
    /// used as-is
    RegistryIncomplete { reason: String },
}

impl std::fmt::Display for SourceDisagreement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceDisagreement::RegistryOnly { variable } => write!(
                f,
                "registry lists variable '{}' which the release does not declare; ignored",
                variable
            ),
            SourceDisagreement::VcsOnly { variable } => write!(
                f,
                "variable '{}' is declared in the release but missing from the registry",
                variable
            ),
            SourceDisagreement::TypeDiffers {
                variable,
                registry,
                vcs,
            } => write!(
                f,
                "variable '{}' has type {} in the release but {} in the registry",
                variable, vcs, registry
            ),
            SourceDisagreement::RequiredDiffers {
                variable,
                registry,
                vcs,
            } => write!(
                f,
                "variable '{}' is {} in the release but {} in the registry",
                variable,
                required_word(*vcs),
                required_word(*registry)
            ),
            SourceDisagreement::RegistryIncomplete { reason } => {
                write!(f, "registry input description unusable ({}); using release declarations", reason)
            }
        }
    }
}

fn required_word(required: bool) -> &'static str {
    if required {
        "required"
    } else {
        "optional"
    }
}

/// Authoritative variables plus the differences found on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub variables: Vec<VariableSpec>,
    pub disagreements: Vec<SourceDisagreement>,
}

/// Merge declared variables with the registry's view.
///
/// `registry` is `Err(reason)` when the registry could not describe the
/// version's inputs.
pub fn reconcile_variables(
    declared: Vec<VariableSpec>,
    registry: Result<&[RegistryInput], String>,
) -> Reconciled {
    let mut disagreements = Vec::new();

    let inputs = match registry {
        Err(reason) => {
            disagreements.push(SourceDisagreement::RegistryIncomplete { reason });
            return Reconciled {
                variables: declared,
                disagreements,
            };
        }
        Ok(inputs) if inputs.is_empty() && !declared.is_empty() => {
            disagreements.push(SourceDisagreement::RegistryIncomplete {
                reason: "registry lists no inputs".to_string(),
            });
            return Reconciled {
                variables: declared,
                disagreements,
            };
        }
        Ok(inputs) => inputs,
    };

    for var in &declared {
        let Some(input) = inputs.iter().find(|i| i.name == var.name) else {
            disagreements.push(SourceDisagreement::VcsOnly {
                variable: var.name.clone(),
            });
            continue;
        };
        if let Some(registry_type) = input.type_expr.as_deref().and_then(VariableType::from_expr) {
            if registry_type != var.var_type && var.var_type != VariableType::Any {
                disagreements.push(SourceDisagreement::TypeDiffers {
                    variable: var.name.clone(),
                    registry: registry_type.to_string(),
                    vcs: var.var_type.to_string(),
                });
            }
        }
        if input.required != var.required {
            disagreements.push(SourceDisagreement::RequiredDiffers {
                variable: var.name.clone(),
                registry: input.required,
                vcs: var.required,
            });
        }
    }

    for input in inputs {
        if !declared.iter().any(|v| v.name == input.name) {
            disagreements.push(SourceDisagreement::RegistryOnly {
                variable: input.name.clone(),
            });
        }
    }

    Reconciled {
        variables: declared,
        disagreements,
    }
}
