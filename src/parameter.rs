// Copyright 2023 the pulseq developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Parameter values and named parameter declarations.
//!
//! A [`Parameter`] is a value source supplied by the caller for one sequencing pass; a
//! [`ParameterDeclaration`] is the template-side description of such a value, carrying optional
//! bounds and a default. Declarations are identified purely by name: two declarations with the
//! same name are the same declaration as far as sets and maps are concerned, whatever their
//! bounds say.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::expression::format_f64;

/// A value source for a single named template parameter, bound for the duration of one
/// sequencing pass.
///
/// `requires_stop` signals that the concrete value is not yet determinable (for example, it
/// depends on a measurement that has not happened); the sequencer will defer compilation of any
/// subtree that references such a parameter rather than proceed with an indeterminate value.
pub trait Parameter: fmt::Debug + Send + Sync {
    /// The concrete value. Only meaningful when [`Parameter::requires_stop`] is `false`.
    fn value(&self) -> f64;

    /// Whether sequencing must stop before this parameter's value may be used.
    fn requires_stop(&self) -> bool;
}

/// The parameter bindings supplied for one sequencing pass, keyed by declaration name.
pub type ParameterMap = HashMap<String, Arc<dyn Parameter>>;

/// A parameter with a value known up front. Never requires a stop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantParameter(f64);

impl ConstantParameter {
    pub fn new(value: f64) -> Self {
        Self(value)
    }
}

impl From<f64> for ConstantParameter {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl Parameter for ConstantParameter {
    fn value(&self) -> f64 {
        self.0
    }

    fn requires_stop(&self) -> bool {
        false
    }
}

/// Build a [`ParameterMap`] from `(name, value)` pairs of constants.
///
/// Convenience for the common case where every parameter is known up front.
pub fn constant_parameters<I, N>(values: I) -> ParameterMap
where
    I: IntoIterator<Item = (N, f64)>,
    N: Into<String>,
{
    values
        .into_iter()
        .map(|(name, value)| {
            (
                name.into(),
                Arc::new(ConstantParameter::new(value)) as Arc<dyn Parameter>,
            )
        })
        .collect()
}

/// One end of a declaration's allowed range.
///
/// A bound may itself be a reference to another declaration, in which case it is resolved
/// through the same parameter bindings as the declaration it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub enum Bound {
    Unbounded,
    Constant(f64),
    Declaration(Arc<ParameterDeclaration>),
}

impl Bound {
    /// Resolve the bound to a concrete value, if it has one.
    fn resolve(&self, parameters: &ParameterMap) -> Result<Option<f64>, ParameterError> {
        match self {
            Bound::Unbounded => Ok(None),
            Bound::Constant(value) => Ok(Some(*value)),
            Bound::Declaration(declaration) => match parameters.get(declaration.name()) {
                Some(parameter) => Ok(Some(parameter.value())),
                None => declaration
                    .default()
                    .map(Some)
                    .ok_or_else(|| ParameterError::UnresolvedBound {
                        name: declaration.name().to_string(),
                    }),
            },
        }
    }

    fn as_constant(&self) -> Option<f64> {
        match self {
            Bound::Constant(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<f64> for Bound {
    fn from(value: f64) -> Self {
        Bound::Constant(value)
    }
}

impl From<ParameterDeclaration> for Bound {
    fn from(declaration: ParameterDeclaration) -> Self {
        Bound::Declaration(Arc::new(declaration))
    }
}

/// A named parameter declaration with optional bounds and default.
///
/// Equality and hashing consider the name only; bounds and default are metadata, not identity.
#[derive(Clone, Debug)]
pub struct ParameterDeclaration {
    name: String,
    min: Bound,
    max: Bound,
    default: Option<f64>,
}

impl ParameterDeclaration {
    /// An unbounded declaration with no default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min: Bound::Unbounded,
            max: Bound::Unbounded,
            default: None,
        }
    }

    pub fn with_min(mut self, min: impl Into<Bound>) -> Result<Self, DeclarationError> {
        self.min = min.into();
        self.check_consistency()?;
        Ok(self)
    }

    pub fn with_max(mut self, max: impl Into<Bound>) -> Result<Self, DeclarationError> {
        self.max = max.into();
        self.check_consistency()?;
        Ok(self)
    }

    pub fn with_default(mut self, default: f64) -> Result<Self, DeclarationError> {
        self.default = Some(default);
        self.check_consistency()?;
        Ok(self)
    }

    // Declaration-valued bounds can only be checked at validation time, so consistency here is
    // limited to the constant parts.
    fn check_consistency(&self) -> Result<(), DeclarationError> {
        let min = self.min.as_constant();
        let max = self.max.as_constant();
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(DeclarationError::MinAboveMax {
                    name: self.name.clone(),
                    min,
                    max,
                });
            }
        }
        if let Some(default) = self.default {
            if min.is_some_and(|min| default < min) || max.is_some_and(|max| default > max) {
                return Err(DeclarationError::DefaultOutOfBounds {
                    name: self.name.clone(),
                    default,
                });
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min(&self) -> &Bound {
        &self.min
    }

    pub fn max(&self) -> &Bound {
        &self.max
    }

    pub fn default(&self) -> Option<f64> {
        self.default
    }

    /// Check a concrete value against this declaration's bounds, resolving declaration-valued
    /// bounds through the same `parameters` bindings.
    pub fn validate(&self, value: f64, parameters: &ParameterMap) -> Result<(), ParameterError> {
        let min = self.min.resolve(parameters)?;
        let max = self.max.resolve(parameters)?;
        if min.is_some_and(|min| value < min) || max.is_some_and(|max| value > max) {
            return Err(ParameterError::IllegalValue {
                name: self.name.clone(),
                value,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Look up the bound value for this declaration, falling back to its default.
    pub fn get_value(&self, parameters: &ParameterMap) -> Result<f64, ParameterError> {
        match parameters.get(&self.name) {
            Some(parameter) => {
                let value = parameter.value();
                self.validate(value, parameters)?;
                Ok(value)
            }
            None => self
                .default
                .ok_or_else(|| ParameterError::NotProvided {
                    name: self.name.clone(),
                }),
        }
    }
}

impl PartialEq for ParameterDeclaration {
    // Identity is the name alone, so that declarations can live in sets keyed by name.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ParameterDeclaration {}

impl Hash for ParameterDeclaration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ParameterDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

fn fmt_bound(bound: &Option<f64>, fallback: &str) -> String {
    match bound {
        Some(value) => format_f64(*value),
        None => fallback.to_string(),
    }
}

/// The ways resolving or validating a parameter can fail. All of these are fatal for the current
/// build call, unlike the recoverable requires-stop signal.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("no value was provided for the parameter `{name}`")]
    NotProvided { name: String },

    #[error("parameter `{name}` must be a whole number, got {value}")]
    NotInteger { name: String, value: f64 },

    #[error(
        "value {value} for parameter `{name}` is outside the declared bounds [{}, {}]",
        fmt_bound(.min, "-inf"),
        fmt_bound(.max, "inf")
    )]
    IllegalValue {
        name: String,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },

    #[error("the bound declaration `{name}` has neither a provided value nor a default")]
    UnresolvedBound { name: String },
}

/// Inconsistencies caught while constructing a declaration.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DeclarationError {
    #[error("minimum {min} exceeds maximum {max} in the declaration of `{name}`")]
    MinAboveMax { name: String, min: f64, max: f64 },

    #[error("default {default} lies outside the declared bounds of `{name}`")]
    DefaultOutOfBounds { name: String, default: f64 },
}
