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

use std::collections::HashSet;
use std::fmt;

use serde_json::{json, Value};

use crate::condition::ConditionMap;
use crate::instruction::{BlockHandle, Instruction, InstructionPointer, RepeatJump};
use crate::parameter::{ParameterDeclaration, ParameterError, ParameterMap};
use crate::sequencer::{Sequencer, SequencingError};
use crate::serialization::{SerializationContext, SerializationError};
use crate::template::{PulseTemplate, TemplatePtr};

/// How often a repetition's body runs: fixed at construction, or bound to a parameter at
/// sequencing time.
#[derive(Clone, Debug)]
pub enum RepetitionCount {
    Constant(u64),
    Declaration(ParameterDeclaration),
}

impl From<u64> for RepetitionCount {
    fn from(count: u64) -> Self {
        RepetitionCount::Constant(count)
    }
}

impl From<ParameterDeclaration> for RepetitionCount {
    fn from(declaration: ParameterDeclaration) -> Self {
        RepetitionCount::Declaration(declaration)
    }
}

impl fmt::Display for RepetitionCount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RepetitionCount::Constant(count) => count.fmt(f),
            RepetitionCount::Declaration(declaration) => write!(f, "`{}`", declaration.name()),
        }
    }
}

/// A combinator running its body template a number of times.
///
/// Compiles to a [`RepeatJump`] into a freshly embedded block holding the body's instructions.
/// When the count is declaration-bound, the bound parameter's value must be a whole number
/// within the declaration's bounds.
#[derive(Clone, Debug)]
pub struct RepetitionPulseTemplate {
    body: TemplatePtr,
    repetition_count: RepetitionCount,
    identifier: Option<String>,
}

impl RepetitionPulseTemplate {
    pub fn new(body: TemplatePtr, repetition_count: impl Into<RepetitionCount>) -> Self {
        Self {
            body,
            repetition_count: repetition_count.into(),
            identifier: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn body(&self) -> &TemplatePtr {
        &self.body
    }

    pub fn repetition_count(&self) -> &RepetitionCount {
        &self.repetition_count
    }

    /// Resolve the count against the bindings. Bounds are checked before wholeness, so an
    /// out-of-range value surfaces as illegal rather than as a fraction.
    fn resolve_count(&self, parameters: &ParameterMap) -> Result<u64, ParameterError> {
        match &self.repetition_count {
            RepetitionCount::Constant(count) => Ok(*count),
            RepetitionCount::Declaration(declaration) => {
                let parameter = parameters.get(declaration.name()).ok_or_else(|| {
                    ParameterError::NotProvided {
                        name: declaration.name().to_string(),
                    }
                })?;
                let value = parameter.value();
                declaration.validate(value, parameters)?;
                if value.fract() != 0.0 {
                    return Err(ParameterError::NotInteger {
                        name: declaration.name().to_string(),
                        value,
                    });
                }
                if value < 0.0 {
                    return Err(ParameterError::IllegalValue {
                        name: declaration.name().to_string(),
                        value,
                        min: Some(0.0),
                        max: None,
                    });
                }
                Ok(value as u64)
            }
        }
    }
}

impl PulseTemplate for RepetitionPulseTemplate {
    fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    fn parameter_names(&self) -> HashSet<String> {
        let mut names = self.body.parameter_names();
        if let RepetitionCount::Declaration(declaration) = &self.repetition_count {
            names.insert(declaration.name().to_string());
        }
        names
    }

    fn parameter_declarations(&self) -> HashSet<ParameterDeclaration> {
        let mut declarations = self.body.parameter_declarations();
        if let RepetitionCount::Declaration(declaration) = &self.repetition_count {
            declarations.insert(declaration.clone());
        }
        declarations
    }

    fn is_interruptable(&self) -> bool {
        self.body.is_interruptable()
    }

    fn defined_channels(&self) -> HashSet<String> {
        self.body.defined_channels()
    }

    fn requires_stop(&self, parameters: &ParameterMap, conditions: &ConditionMap) -> bool {
        let count_stop = match &self.repetition_count {
            RepetitionCount::Constant(_) => false,
            RepetitionCount::Declaration(declaration) => {
                let parameter_stop = parameters
                    .get(declaration.name())
                    .map_or(false, |parameter| parameter.requires_stop());
                let condition_stop = conditions
                    .get(declaration.name())
                    .map_or(false, |condition| condition.requires_stop());
                parameter_stop || condition_stop
            }
        };
        count_stop || self.body.requires_stop(parameters, conditions)
    }

    fn build_sequence(
        &self,
        sequencer: &mut Sequencer,
        parameters: &ParameterMap,
        conditions: &ConditionMap,
        target: BlockHandle,
    ) -> Result<(), SequencingError> {
        let count = self.resolve_count(parameters)?;
        let body_block = sequencer.new_block_under(target);
        sequencer.push_to(
            self.body.clone(),
            parameters.clone(),
            conditions.clone(),
            body_block,
        );
        sequencer
            .block_mut(target)
            .add(Instruction::RepeatJump(RepeatJump::new(
                count,
                InstructionPointer::block_start(body_block),
            )));
        Ok(())
    }

    fn type_identifier(&self) -> &'static str {
        "repetition_pulse"
    }

    fn serialization_data(
        &self,
        context: &mut dyn SerializationContext,
    ) -> Result<Value, SerializationError> {
        let repetition_count = match &self.repetition_count {
            RepetitionCount::Constant(count) => json!(count),
            RepetitionCount::Declaration(declaration) => {
                context.serialize_declaration(declaration)?
            }
        };
        Ok(json!({
            "body": context.serialize_template(&self.body)?,
            "repetition_count": repetition_count,
        }))
    }
}

impl fmt::Display for RepetitionPulseTemplate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "repeat {} times", self.repetition_count)
    }
}
