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

//! The executable instruction model: instructions, instruction blocks, and the compiled
//! [`InstructionSequence`] artifact handed to a hardware driver.
//!
//! Blocks live in an arena owned by the artifact and reference each other through
//! [`BlockHandle`]s; control-flow instructions address their targets with an
//! [`InstructionPointer`] (block plus offset). A driver executes the root block front to back,
//! interpreting [`RepeatJump`] as "execute the pointed block N times, then fall through".

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::waveform::FunctionWaveform;

/// The index of an [`InstructionBlock`] within one compiled artifact's arena.
///
/// Handles are minted by the [`Sequencer`](crate::sequencer::Sequencer) that owns the arena and
/// are only meaningful within the artifact produced by that same sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHandle(usize);

impl BlockHandle {
    /// The root block every artifact starts with.
    pub const ROOT: BlockHandle = BlockHandle(0);

    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "block {}", self.0)
    }
}

/// The addressing unit of control-flow instructions: a target block plus an offset within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstructionPointer {
    pub block: BlockHandle,
    pub offset: usize,
}

impl InstructionPointer {
    pub fn new(block: BlockHandle, offset: usize) -> Self {
        Self { block, offset }
    }

    /// A pointer to the first instruction of `block`.
    pub fn block_start(block: BlockHandle) -> Self {
        Self { block, offset: 0 }
    }
}

impl fmt::Display for InstructionPointer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "@{}:{}", self.block.index(), self.offset)
    }
}

/// Play a resolved waveform on its channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Exec {
    pub waveform: FunctionWaveform,
}

impl Exec {
    pub fn new(waveform: FunctionWaveform) -> Self {
        Self { waveform }
    }
}

impl fmt::Display for Exec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EXEC {}", self.waveform)
    }
}

/// Unconditionally continue execution at the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goto {
    pub target: InstructionPointer,
}

impl Goto {
    pub fn new(target: InstructionPointer) -> Self {
        Self { target }
    }
}

impl fmt::Display for Goto {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GOTO {}", self.target)
    }
}

/// Execute the block at the target `count` times, then fall through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatJump {
    pub count: u64,
    pub target: InstructionPointer,
}

impl RepeatJump {
    pub fn new(count: u64, target: InstructionPointer) -> Self {
        Self { count, target }
    }
}

impl fmt::Display for RepeatJump {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "REPJ {} {}", self.count, self.target)
    }
}

/// One executable instruction. The set is small today and expected to grow with further
/// template variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Exec(Exec),
    Goto(Goto),
    RepeatJump(RepeatJump),
    Stop,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Exec(exec) => exec.fmt(f),
            Instruction::Goto(goto) => goto.fmt(f),
            Instruction::RepeatJump(repeat_jump) => repeat_jump.fmt(f),
            Instruction::Stop => write!(f, "STOP"),
        }
    }
}

/// An ordered, append-only sequence of instructions plus the embedded blocks allocated
/// beneath it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InstructionBlock {
    instructions: Vec<Instruction>,
    embedded_blocks: Vec<BlockHandle>,
}

impl InstructionBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub(crate) fn add_embedded_block(&mut self, handle: BlockHandle) {
        self.embedded_blocks.push(handle);
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn embedded_blocks(&self) -> &[BlockHandle] {
        &self.embedded_blocks
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// The compiled artifact: the root instruction block and every embedded block it transitively
/// references, addressable by [`InstructionPointer`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstructionSequence {
    blocks: Vec<InstructionBlock>,
}

impl InstructionSequence {
    pub(crate) fn from_blocks(blocks: Vec<InstructionBlock>) -> Self {
        Self { blocks }
    }

    pub fn root(&self) -> &InstructionBlock {
        &self.blocks[BlockHandle::ROOT.index()]
    }

    pub fn block(&self, handle: BlockHandle) -> Option<&InstructionBlock> {
        self.blocks.get(handle.index())
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockHandle, &InstructionBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(index, block)| (BlockHandle::new(index), block))
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Resolve an instruction pointer to the instruction it addresses.
    pub fn instruction_at(&self, pointer: InstructionPointer) -> Option<&Instruction> {
        self.block(pointer.block)?.instructions().get(pointer.offset)
    }

    /// The total number of instructions across all blocks.
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(InstructionBlock::len).sum()
    }
}

impl fmt::Display for InstructionSequence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (handle, block) in self.blocks() {
            writeln!(f, "{handle}:")?;
            for instruction in block.instructions() {
                writeln!(f, "    {instruction}")?;
            }
        }
        Ok(())
    }
}
