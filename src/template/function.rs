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

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use itertools::Itertools;
use serde_json::{json, Value};

use crate::condition::ConditionMap;
use crate::expression::Expression;
use crate::instruction::{BlockHandle, Exec, Instruction};
use crate::parameter::{ParameterDeclaration, ParameterError, ParameterMap};
use crate::sequencer::{Sequencer, SequencingError};
use crate::serialization::{SerializationContext, SerializationError};
use crate::template::PulseTemplate;
use crate::waveform::{FunctionWaveform, MeasurementWindow, TIME_VARIABLE};

/// An atomic leaf template defined by a shape expression over time and its parameters.
///
/// The shape expression is evaluated over the free variable `t` plus the template's parameters;
/// the duration expression over the parameters alone. Sequencing resolves every parameter to a
/// concrete value and emits a single [`Exec`] carrying the resulting [`FunctionWaveform`].
#[derive(Clone, Debug)]
pub struct FunctionPulseTemplate {
    expression: Expression,
    duration_expression: Expression,
    channel: String,
    measurement: bool,
    identifier: Option<String>,
}

impl FunctionPulseTemplate {
    pub fn new(
        expression: Expression,
        duration_expression: Expression,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            expression,
            duration_expression,
            channel: channel.into(),
            measurement: false,
            identifier: None,
        }
    }

    /// Mark the produced waveform as a measurement: it will carry a single measurement window
    /// spanning its full duration.
    pub fn with_measurement(mut self) -> Self {
        self.measurement = true;
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn duration_expression(&self) -> &Expression {
        &self.duration_expression
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_measurement(&self) -> bool {
        self.measurement
    }

    /// Resolve every referenced parameter against the bindings, in name order.
    fn resolve_parameters(
        &self,
        parameters: &ParameterMap,
    ) -> Result<IndexMap<String, f64>, ParameterError> {
        self.parameter_names()
            .into_iter()
            .sorted()
            .map(|name| {
                let parameter = parameters
                    .get(&name)
                    .ok_or(ParameterError::NotProvided { name: name.clone() })?;
                Ok((name, parameter.value()))
            })
            .collect()
    }
}

impl PulseTemplate for FunctionPulseTemplate {
    fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    fn parameter_names(&self) -> HashSet<String> {
        let mut names = self.expression.variables();
        names.extend(self.duration_expression.variables());
        names.remove(TIME_VARIABLE);
        names
    }

    fn parameter_declarations(&self) -> HashSet<ParameterDeclaration> {
        self.parameter_names()
            .into_iter()
            .map(ParameterDeclaration::new)
            .collect()
    }

    fn is_interruptable(&self) -> bool {
        false
    }

    fn defined_channels(&self) -> HashSet<String> {
        HashSet::from([self.channel.clone()])
    }

    fn requires_stop(&self, parameters: &ParameterMap, _conditions: &ConditionMap) -> bool {
        self.parameter_names()
            .iter()
            .filter_map(|name| parameters.get(name))
            .any(|parameter| parameter.requires_stop())
    }

    fn build_sequence(
        &self,
        sequencer: &mut Sequencer,
        parameters: &ParameterMap,
        _conditions: &ConditionMap,
        target: BlockHandle,
    ) -> Result<(), SequencingError> {
        let resolved = self.resolve_parameters(parameters)?;
        let measurement_windows = if self.measurement {
            let bindings: HashMap<&str, f64> = resolved
                .iter()
                .map(|(name, &value)| (name.as_str(), value))
                .collect();
            let duration = self.duration_expression.evaluate(&bindings)?;
            vec![MeasurementWindow::new(0.0, duration)]
        } else {
            Vec::new()
        };
        let waveform = FunctionWaveform::new(
            resolved,
            self.expression.clone(),
            self.duration_expression.clone(),
            &self.channel,
            measurement_windows,
        )?;
        sequencer
            .block_mut(target)
            .add(Instruction::Exec(Exec::new(waveform)));
        Ok(())
    }

    fn type_identifier(&self) -> &'static str {
        "function_pulse"
    }

    fn serialization_data(
        &self,
        context: &mut dyn SerializationContext,
    ) -> Result<Value, SerializationError> {
        Ok(json!({
            "expression": context.serialize_expression(&self.expression),
            "duration_expression": context.serialize_expression(&self.duration_expression),
            "channel": self.channel,
            "measurement": self.measurement,
        }))
    }
}

impl fmt::Display for FunctionPulseTemplate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} on {} for {}",
            self.expression, self.channel, self.duration_expression
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::constant_parameters;
    use crate::sequencer::Sequenced;
    use crate::template::TemplatePtr;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn template(shape: &str, duration: &str) -> FunctionPulseTemplate {
        FunctionPulseTemplate::new(
            shape.parse().unwrap(),
            duration.parse().unwrap(),
            "out",
        )
    }

    #[test]
    fn parameter_names_exclude_the_time_variable() {
        let template = template("a + b*t", "c");
        assert_eq!(
            template.parameter_names(),
            HashSet::from(["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(
            template
                .parameter_declarations()
                .iter()
                .map(ParameterDeclaration::name)
                .map(String::from)
                .collect::<HashSet<_>>(),
            template.parameter_names()
        );
    }

    #[test]
    fn requires_stop_when_any_bound_parameter_does() {
        use crate::parameter::Parameter;

        #[derive(Debug)]
        struct PendingParameter;

        impl Parameter for PendingParameter {
            fn value(&self) -> f64 {
                0.0
            }

            fn requires_stop(&self) -> bool {
                true
            }
        }

        let template = template("a*t", "b");
        let conditions = ConditionMap::new();

        let mut parameters = constant_parameters([("a", 1.0), ("b", 2.0)]);
        assert!(!template.requires_stop(&parameters, &conditions));

        parameters.insert("a".to_string(), Arc::new(PendingParameter));
        assert!(template.requires_stop(&parameters, &conditions));
    }

    #[test]
    fn sequencing_emits_one_exec_with_the_resolved_waveform() {
        let template: TemplatePtr = Arc::new(template("a*t", "b"));
        let parameters = constant_parameters([("a", 2.0), ("b", 4.0)]);

        let mut sequencer = Sequencer::new();
        sequencer.push(template, parameters, ConditionMap::new());
        let sequence = match sequencer.build().unwrap() {
            Sequenced::Complete(sequence) => sequence,
            Sequenced::Deferred(_) => panic!("expected a complete pass"),
        };

        let root = sequence.root();
        assert_eq!(root.len(), 2);
        match &root.instructions()[0] {
            Instruction::Exec(exec) => {
                assert_eq!(exec.waveform.duration(), 4.0);
                assert_eq!(exec.waveform.channel(), "out");
                assert_eq!(
                    exec.waveform.parameters().get("a").copied(),
                    Some(2.0)
                );
            }
            other => panic!("expected an Exec, got {other}"),
        }
        assert_eq!(root.instructions()[1], Instruction::Stop);
    }

    #[test]
    fn a_missing_parameter_fails_without_appending() {
        let template: TemplatePtr = Arc::new(template("a*t", "b"));
        let parameters = constant_parameters([("a", 2.0)]);

        let mut sequencer = Sequencer::new();
        sequencer.push(template, parameters, ConditionMap::new());
        let error = sequencer.build().unwrap_err();
        assert_eq!(
            error,
            SequencingError::Parameter(ParameterError::NotProvided {
                name: "b".to_string()
            })
        );
    }

    #[test]
    fn measurement_templates_carry_a_full_duration_window() {
        let template: TemplatePtr =
            Arc::new(template("a*t", "b").with_measurement());
        let parameters = constant_parameters([("a", 1.0), ("b", 3.0)]);

        let mut sequencer = Sequencer::new();
        sequencer.push(template, parameters, ConditionMap::new());
        let sequence = match sequencer.build().unwrap() {
            Sequenced::Complete(sequence) => sequence,
            Sequenced::Deferred(_) => panic!("expected a complete pass"),
        };

        match &sequence.root().instructions()[0] {
            Instruction::Exec(exec) => assert_eq!(
                exec.waveform.measurement_windows(),
                &[MeasurementWindow::new(0.0, 3.0)]
            ),
            other => panic!("expected an Exec, got {other}"),
        }
    }
}
