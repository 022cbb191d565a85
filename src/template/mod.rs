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

//! The pulse template hierarchy: the polymorphic [`PulseTemplate`] contract and its concrete
//! variants.
//!
//! A pulse template is an abstract, reusable description of a control waveform, possibly with
//! unresolved named parameters. Templates form an immutable, acyclic tree shared through
//! [`TemplatePtr`]; several combinators may reference the same body without copying it. The
//! [`Sequencer`](crate::sequencer::Sequencer) compiles such a tree into an
//! [`InstructionSequence`](crate::instruction::InstructionSequence) by driving each node's
//! [`build_sequence`](PulseTemplate::build_sequence).

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::condition::ConditionMap;
use crate::instruction::BlockHandle;
use crate::parameter::{ParameterDeclaration, ParameterMap};
use crate::sequencer::{Sequencer, SequencingError};
use crate::serialization::{SerializationContext, SerializationError};

mod function;
mod repetition;

pub use function::FunctionPulseTemplate;
pub use repetition::{RepetitionCount, RepetitionPulseTemplate};

/// A shared handle to a node of an immutable template tree.
pub type TemplatePtr = Arc<dyn PulseTemplate>;

/// The contract every template variant fulfils.
///
/// `requires_stop` must be consulted before `build_sequence`; calling `build_sequence` while it
/// returns `true` is a contract violation on the caller's side. The sequencer enforces this for
/// every work item it drains.
pub trait PulseTemplate: fmt::Debug + Send + Sync {
    /// A stable name for serialization and reuse, if the template carries one.
    fn identifier(&self) -> Option<&str>;

    /// The names of every parameter this template (transitively) requires.
    fn parameter_names(&self) -> HashSet<String>;

    /// The declarations describing those parameters. Invariant: the declaration names equal
    /// [`parameter_names`](Self::parameter_names).
    fn parameter_declarations(&self) -> HashSet<ParameterDeclaration>;

    /// Whether execution of this template may safely be halted mid-way. Metadata only; the
    /// sequencer does not act on it.
    fn is_interruptable(&self) -> bool;

    /// The channel identifiers this template produces output on.
    fn defined_channels(&self) -> HashSet<String>;

    /// Whether sequencing this subtree must be deferred because a referenced parameter or
    /// condition cannot report a concrete value yet. A recoverable "not yet", never an error.
    fn requires_stop(&self, parameters: &ParameterMap, conditions: &ConditionMap) -> bool;

    /// Emit this template's contribution into `target`, registering child expansions with the
    /// sequencer. On failure nothing may have been appended or allocated.
    fn build_sequence(
        &self,
        sequencer: &mut Sequencer,
        parameters: &ParameterMap,
        conditions: &ConditionMap,
        target: BlockHandle,
    ) -> Result<(), SequencingError>;

    /// The stable type tag written into serialized data dictionaries.
    fn type_identifier(&self) -> &'static str;

    /// The data dictionary sufficient to reconstruct this template, with subtemplates and
    /// declarations written through `context`.
    fn serialization_data(
        &self,
        context: &mut dyn SerializationContext,
    ) -> Result<Value, SerializationError>;
}
