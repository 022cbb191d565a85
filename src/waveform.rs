//! Sampled-function waveforms, the fully parameter-resolved output of leaf templates.

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::expression::{EvaluationError, Expression};
use crate::floating_point_eq;

/// The name of the sequencing-time variable within shape expressions.
pub const TIME_VARIABLE: &str = "t";

/// A time interval within a waveform during which acquisition hardware should record data.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MeasurementWindow {
    pub begin: f64,
    pub end: f64,
}

impl MeasurementWindow {
    pub fn new(begin: f64, end: f64) -> Self {
        Self { begin, end }
    }
}

impl PartialEq for MeasurementWindow {
    fn eq(&self, other: &Self) -> bool {
        floating_point_eq::eq(self.begin, other.begin) && floating_point_eq::eq(self.end, other.end)
    }
}

impl Eq for MeasurementWindow {}

/// Errors encountered while resolving a waveform from a leaf template.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum WaveformError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("waveform duration evaluated to a negative number ({0})")]
    NegativeDuration(f64),

    #[error("waveform duration evaluated to NaN")]
    IndeterminateDuration,
}

/// A waveform defined by a shape expression evaluated over a snapshot of resolved parameter
/// values.
///
/// The duration expression is evaluated once at construction and cached; the shape expression
/// stays symbolic until [`FunctionWaveform::sample`] is called. Instances are immutable after
/// construction, and equality is structural over the snapshot, both expressions, the channel,
/// and the measurement windows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionWaveform {
    parameters: IndexMap<String, f64>,
    expression: Expression,
    duration_expression: Expression,
    channel: String,
    measurement_windows: Vec<MeasurementWindow>,
    duration: f64,
}

impl FunctionWaveform {
    pub fn new(
        parameters: IndexMap<String, f64>,
        expression: Expression,
        duration_expression: Expression,
        channel: impl Into<String>,
        measurement_windows: Vec<MeasurementWindow>,
    ) -> Result<Self, WaveformError> {
        let bindings: HashMap<&str, f64> = parameters
            .iter()
            .map(|(name, &value)| (name.as_str(), value))
            .collect();
        let duration = duration_expression.evaluate(&bindings)?;
        if duration.is_nan() {
            return Err(WaveformError::IndeterminateDuration);
        }
        if duration < 0.0 {
            return Err(WaveformError::NegativeDuration(duration));
        }
        Ok(Self {
            parameters,
            expression,
            duration_expression,
            channel: channel.into(),
            measurement_windows,
            duration,
        })
    }

    /// The resolved parameter snapshot the waveform was built from.
    pub fn parameters(&self) -> &IndexMap<String, f64> {
        &self.parameters
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

    pub fn measurement_windows(&self) -> &[MeasurementWindow] {
        &self.measurement_windows
    }

    /// The waveform's duration, evaluated once at construction.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn defined_channels(&self) -> HashSet<String> {
        HashSet::from([self.channel.clone()])
    }

    /// Evaluate the shape expression at each requested time point.
    ///
    /// Sampling outside `[0, duration)` is not clamped; callers that care must restrict the
    /// requested points themselves.
    pub fn sample(&self, time_points: &[f64]) -> Result<Vec<f64>, EvaluationError> {
        let mut bindings: HashMap<String, f64> = self
            .parameters
            .iter()
            .map(|(name, &value)| (name.clone(), value))
            .collect();
        time_points
            .iter()
            .map(|&t| {
                bindings.insert(TIME_VARIABLE.to_string(), t);
                self.expression.evaluate(&bindings)
            })
            .collect()
    }
}

impl PartialEq for FunctionWaveform {
    fn eq(&self, other: &Self) -> bool {
        self.parameters.len() == other.parameters.len()
            && self.parameters.iter().all(|(name, &value)| {
                other
                    .parameters
                    .get(name)
                    .is_some_and(|&other_value| floating_point_eq::eq(value, other_value))
            })
            && self.expression == other.expression
            && self.duration_expression == other.duration_expression
            && self.channel == other.channel
            && self.measurement_windows == other.measurement_windows
    }
}

impl Eq for FunctionWaveform {}

impl fmt::Display for FunctionWaveform {
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
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn waveform(
        parameters: &[(&str, f64)],
        expression: &str,
        duration_expression: &str,
        channel: &str,
    ) -> FunctionWaveform {
        FunctionWaveform::new(
            parameters
                .iter()
                .map(|&(name, value)| (name.to_string(), value))
                .collect(),
            Expression::from_str(expression).unwrap(),
            Expression::from_str(duration_expression).unwrap(),
            channel,
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn equality_is_structural() {
        let wf1a = waveform(&[("a", 2.0), ("b", 1.0)], "a*t", "b", "A");
        let wf1b = waveform(&[("a", 2.0), ("b", 1.0)], "a*t", "b", "A");
        let wf2 = waveform(&[("a", 3.0), ("b", 1.0)], "a*t", "b", "A");
        let wf3 = waveform(&[("a", 2.0), ("b", 1.0)], "a*t+2", "b", "A");
        let wf4 = waveform(&[("a", 2.0), ("c", 2.0)], "a*t", "c", "A");
        let wf5 = waveform(&[("a", 2.0), ("b", 1.0)], "a*t", "b", "B");

        assert_eq!(wf1a, wf1a);
        assert_eq!(wf1a, wf1b);
        assert_ne!(wf1a, wf2);
        assert_ne!(wf1a, wf3);
        assert_ne!(wf1a, wf4);
        assert_ne!(wf1a, wf5);
    }

    #[test]
    fn snapshot_order_does_not_affect_equality() {
        let left = waveform(&[("a", 2.0), ("b", 1.0)], "a*t", "b", "A");
        let right = waveform(&[("b", 1.0), ("a", 2.0)], "a*t", "b", "A");
        assert_eq!(left, right);
    }

    #[test]
    fn defined_channels_is_the_single_channel() {
        let wf = waveform(&[], "t", "4", "A");
        assert_eq!(wf.defined_channels(), HashSet::from(["A".to_string()]));
    }

    #[test]
    fn duration_is_evaluated_at_construction() {
        let wf = waveform(&[("foo", 2.5)], "2*t", "4*foo/5", "A");
        assert_eq!(wf.duration(), 2.0);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let result = FunctionWaveform::new(
            IndexMap::new(),
            Expression::from_str("t").unwrap(),
            Expression::from_str("0 - 4").unwrap(),
            "A",
            vec![],
        );
        assert_eq!(result, Err(WaveformError::NegativeDuration(-4.0)));
    }

    #[test]
    fn nan_duration_is_rejected() {
        let result = FunctionWaveform::new(
            IndexMap::new(),
            Expression::from_str("t").unwrap(),
            Expression::from_str("0/0").unwrap(),
            "A",
            vec![],
        );
        assert_eq!(result, Err(WaveformError::IndeterminateDuration));
    }

    #[test]
    fn unbound_duration_variable_is_rejected() {
        let result = FunctionWaveform::new(
            IndexMap::new(),
            Expression::from_str("t").unwrap(),
            Expression::from_str("4*foo/5").unwrap(),
            "A",
            vec![],
        );
        assert_eq!(
            result,
            Err(WaveformError::Evaluation(
                EvaluationError::UndefinedVariable("foo".to_string())
            ))
        );
    }

    #[test]
    fn samples_the_shape_at_requested_time_points() {
        let wf = waveform(&[("b", 2.0), ("c", 10.0)], "(t+1)^b", "c^b", "A");
        let samples = wf.sample(&[0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(samples, vec![1.0, 4.0, 9.0, 16.0]);
    }
}
