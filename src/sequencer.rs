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

//! The sequencer: drives recursive compilation of a template tree into instruction blocks.
//!
//! Compilation is cooperative and single-threaded. Each pending work item binds a template to
//! the block it expands into; draining pops items off a stack, checks the template's
//! [`requires_stop`](crate::template::PulseTemplate::requires_stop) verdict, and either expands
//! it or defers the whole pass back to the caller. Deferral is a poll-and-retry contract, not a
//! suspension: the caller re-runs [`Sequencer::build`] once external state (an armed trigger, a
//! now-determinable parameter) has changed.

use log::{debug, trace};

use crate::condition::ConditionMap;
use crate::expression::EvaluationError;
use crate::instruction::{BlockHandle, Instruction, InstructionBlock, InstructionSequence};
use crate::parameter::{ParameterError, ParameterMap};
use crate::template::TemplatePtr;
use crate::waveform::WaveformError;

/// A fatal sequencing failure. Unlike a deferred pass, these abort compilation and require the
/// caller to correct the inputs before retrying.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SequencingError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Waveform(#[from] WaveformError),
}

/// The outcome of one compilation pass.
#[derive(Debug)]
pub enum Sequenced {
    /// Every work item was expanded; the artifact is complete.
    Complete(InstructionSequence),
    /// A work item requires a stop. The returned sequencer retains all pending work and every
    /// block built so far; run [`Sequencer::build`] on it again once the blocking state has
    /// changed.
    Deferred(Sequencer),
}

#[derive(Debug)]
struct WorkItem {
    template: TemplatePtr,
    parameters: ParameterMap,
    conditions: ConditionMap,
    target: BlockHandle,
}

/// Compiles template trees into an [`InstructionSequence`].
///
/// One sequencer owns one compilation pass: its block arena and its pending-work stack. Blocks
/// are handed to the caller only on completion; a failed pass leaves no artifact behind.
#[derive(Debug)]
pub struct Sequencer {
    blocks: Vec<InstructionBlock>,
    stack: Vec<WorkItem>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            blocks: vec![InstructionBlock::new()],
            stack: Vec::new(),
        }
    }

    /// Register a template for expansion into the root block.
    pub fn push(&mut self, template: TemplatePtr, parameters: ParameterMap, conditions: ConditionMap) {
        self.push_to(template, parameters, conditions, BlockHandle::ROOT);
    }

    /// Register a template for expansion into `target`. Combinators use this to schedule their
    /// children; items are drained LIFO, so a child pushed during expansion runs before any
    /// previously pending sibling.
    pub fn push_to(
        &mut self,
        template: TemplatePtr,
        parameters: ParameterMap,
        conditions: ConditionMap,
        target: BlockHandle,
    ) {
        self.stack.push(WorkItem {
            template,
            parameters,
            conditions,
            target,
        });
    }

    /// Allocate a fresh block embedded under `parent` and return its handle.
    pub fn new_block_under(&mut self, parent: BlockHandle) -> BlockHandle {
        let handle = BlockHandle::new(self.blocks.len());
        self.blocks.push(InstructionBlock::new());
        self.blocks[parent.index()].add_embedded_block(handle);
        handle
    }

    pub fn block(&self, handle: BlockHandle) -> &InstructionBlock {
        &self.blocks[handle.index()]
    }

    pub fn block_mut(&mut self, handle: BlockHandle) -> &mut InstructionBlock {
        &mut self.blocks[handle.index()]
    }

    /// Whether no work is pending. True for a fresh sequencer and after a completed pass.
    pub fn has_finished(&self) -> bool {
        self.stack.is_empty()
    }

    /// Drain the pending work and produce the compiled artifact.
    ///
    /// Consumes the sequencer: a complete pass finalizes the root block with an
    /// [`Instruction::Stop`] and hands over every block; a deferred pass hands the sequencer
    /// itself back for a later retry. A fatal error discards the pass entirely.
    pub fn build(mut self) -> Result<Sequenced, SequencingError> {
        while let Some(item) = self.stack.pop() {
            if item.template.requires_stop(&item.parameters, &item.conditions) {
                debug!(
                    "deferring compilation: a template targeting {} requires a stop",
                    item.target
                );
                self.stack.push(item);
                return Ok(Sequenced::Deferred(self));
            }
            trace!("expanding a template into {}", item.target);
            item.template
                .build_sequence(&mut self, &item.parameters, &item.conditions, item.target)?;
        }
        self.blocks[BlockHandle::ROOT.index()].add(Instruction::Stop);
        Ok(Sequenced::Complete(InstructionSequence::from_blocks(
            self.blocks,
        )))
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Goto, InstructionPointer};
    use crate::template::test_support::StubTemplate;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn complete(sequencer: Sequencer) -> InstructionSequence {
        match sequencer.build().unwrap() {
            Sequenced::Complete(sequence) => sequence,
            Sequenced::Deferred(_) => panic!("expected a complete pass"),
        }
    }

    #[test]
    fn an_empty_pass_yields_a_lone_stop() {
        let sequence = complete(Sequencer::new());
        assert_eq!(sequence.block_count(), 1);
        assert_eq!(sequence.root().instructions(), &[Instruction::Stop]);
    }

    #[test]
    fn expands_pending_work_into_the_root_block() {
        let mut sequencer = Sequencer::new();
        sequencer.push(
            Arc::new(StubTemplate::new()),
            ParameterMap::new(),
            ConditionMap::new(),
        );
        assert!(!sequencer.has_finished());

        let sequence = complete(sequencer);
        assert_eq!(
            sequence.root().instructions(),
            &[
                Instruction::Goto(Goto::new(InstructionPointer::block_start(
                    BlockHandle::ROOT
                ))),
                Instruction::Stop,
            ]
        );
    }

    #[test]
    fn a_stop_requiring_item_defers_the_pass_and_survives_the_retry() {
        let mut template = StubTemplate::new();
        template.requires_stop = true;
        let mut sequencer = Sequencer::new();
        sequencer.push(Arc::new(template), ParameterMap::new(), ConditionMap::new());

        let deferred = match sequencer.build().unwrap() {
            Sequenced::Deferred(sequencer) => sequencer,
            Sequenced::Complete(_) => panic!("expected a deferred pass"),
        };
        assert!(!deferred.has_finished());

        // Still deferred on retry while the verdict is unchanged.
        match deferred.build().unwrap() {
            Sequenced::Deferred(_) => {}
            Sequenced::Complete(_) => panic!("expected a deferred pass"),
        }
    }

    #[test]
    fn deferred_passes_format_for_debugging() {
        let mut template = StubTemplate::new();
        template.requires_stop = true;
        let mut sequencer = Sequencer::new();
        sequencer.push(Arc::new(template), ParameterMap::new(), ConditionMap::new());

        let outcome = sequencer.build().unwrap();
        let text = format!("{outcome:?}");
        assert!(text.starts_with("Deferred(Sequencer"));
    }

    #[test]
    fn embedded_blocks_are_recorded_under_their_parent() {
        let mut sequencer = Sequencer::new();
        let child = sequencer.new_block_under(BlockHandle::ROOT);
        let grandchild = sequencer.new_block_under(child);
        assert_eq!(sequencer.block(BlockHandle::ROOT).embedded_blocks(), &[child]);
        assert_eq!(sequencer.block(child).embedded_blocks(), &[grandchild]);
    }
}
