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

//! Modeling and compilation of parameterized hardware pulse sequences.
//!
//! Within this crate you'll find:
//!
//! * A [template hierarchy] describing pulses abstractly, with timings, amplitudes, and
//!   repetition counts left as named [parameters]
//! * A [sequencer] that compiles a template tree against concrete parameter bindings into a
//!   flat [instruction artifact] for a hardware driver, deferring cleanly when a referenced
//!   value is not yet determinable
//! * Symbolic arithmetic [expressions] with a text parser and evaluator
//! * A [serialization capability] for storing templates as data dictionaries and
//!   reconstructing them through an explicit reference-resolution store
//!
//! [expressions]: crate::expression::Expression
//! [instruction artifact]: crate::instruction::InstructionSequence
//! [parameters]: crate::parameter::Parameter
//! [sequencer]: crate::sequencer::Sequencer
//! [serialization capability]: crate::serialization::InMemoryStore
//! [template hierarchy]: crate::template::PulseTemplate

pub mod condition;
pub mod expression;
mod floating_point_eq;
pub mod instruction;
pub mod parameter;
pub(crate) mod parser;
pub mod sequencer;
pub mod serialization;
pub mod template;
pub mod validation;
pub mod waveform;

pub use parser::{LexError, ParseError};
pub use sequencer::{Sequenced, Sequencer, SequencingError};
pub use template::{PulseTemplate, TemplatePtr};
