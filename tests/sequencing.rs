//! End-to-end compilation of template trees into instruction artifacts.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use pulseq::condition::{ConditionMap, HardwareCondition};
use pulseq::instruction::{BlockHandle, Instruction, InstructionPointer};
use pulseq::parameter::{constant_parameters, ParameterDeclaration, ParameterError, ParameterMap};
use pulseq::template::{FunctionPulseTemplate, RepetitionPulseTemplate};
use pulseq::{Sequenced, Sequencer, SequencingError, TemplatePtr};

fn ramp() -> TemplatePtr {
    Arc::new(FunctionPulseTemplate::new(
        "a*t".parse().unwrap(),
        "b".parse().unwrap(),
        "out",
    ))
}

fn build(
    template: TemplatePtr,
    parameters: ParameterMap,
    conditions: ConditionMap,
) -> Result<Sequenced, SequencingError> {
    let mut sequencer = Sequencer::new();
    sequencer.push(template, parameters, conditions);
    sequencer.build()
}

fn complete(
    template: TemplatePtr,
    parameters: ParameterMap,
    conditions: ConditionMap,
) -> pulseq::instruction::InstructionSequence {
    match build(template, parameters, conditions).unwrap() {
        Sequenced::Complete(sequence) => sequence,
        Sequenced::Deferred(_) => panic!("expected a complete pass"),
    }
}

#[test]
fn nested_repetitions_compile_to_a_block_tree() {
    // repeat 2 { repeat 3 { a*t for b } }
    let inner = Arc::new(RepetitionPulseTemplate::new(ramp(), 3u64));
    let outer: TemplatePtr = Arc::new(RepetitionPulseTemplate::new(inner, 2u64));

    let sequence = complete(
        outer,
        constant_parameters([("a", 1.0), ("b", 4.0)]),
        ConditionMap::new(),
    );

    assert_eq!(sequence.block_count(), 3);

    let root = sequence.root();
    assert_eq!(root.embedded_blocks().len(), 1);
    let outer_body = root.embedded_blocks()[0];
    assert_eq!(
        root.instructions(),
        &[
            Instruction::RepeatJump(pulseq::instruction::RepeatJump::new(
                2,
                InstructionPointer::block_start(outer_body),
            )),
            Instruction::Stop,
        ]
    );

    let outer_block = sequence.block(outer_body).unwrap();
    assert_eq!(outer_block.embedded_blocks().len(), 1);
    let inner_body = outer_block.embedded_blocks()[0];
    assert_eq!(outer_block.len(), 1);
    match &outer_block.instructions()[0] {
        Instruction::RepeatJump(repeat_jump) => {
            assert_eq!(repeat_jump.count, 3);
            assert_eq!(repeat_jump.target, InstructionPointer::block_start(inner_body));
        }
        other => panic!("expected a RepeatJump, got {other}"),
    }

    let inner_block = sequence.block(inner_body).unwrap();
    assert_eq!(inner_block.len(), 1);
    match &inner_block.instructions()[0] {
        Instruction::Exec(exec) => {
            assert_eq!(exec.waveform.channel(), "out");
            assert_eq!(exec.waveform.duration(), 4.0);
        }
        other => panic!("expected an Exec, got {other}"),
    }

    // Pointers resolve across embedded blocks.
    let target = InstructionPointer::block_start(inner_body);
    assert!(matches!(
        sequence.instruction_at(target),
        Some(Instruction::Exec(_))
    ));
    assert_eq!(
        sequence.instruction_at(InstructionPointer::new(BlockHandle::ROOT, 1)),
        Some(&Instruction::Stop)
    );
}

#[test]
fn a_declared_count_binds_at_compile_time() {
    let declaration = ParameterDeclaration::new("foo").with_max(5.0).unwrap();
    let template: TemplatePtr = Arc::new(RepetitionPulseTemplate::new(ramp(), declaration));

    let sequence = complete(
        template,
        constant_parameters([("a", 1.0), ("b", 1.0), ("foo", 3.0)]),
        ConditionMap::new(),
    );

    match &sequence.root().instructions()[0] {
        Instruction::RepeatJump(repeat_jump) => assert_eq!(repeat_jump.count, 3),
        other => panic!("expected a RepeatJump, got {other}"),
    }
}

#[test]
fn a_validation_failure_produces_no_artifact() {
    let declaration = ParameterDeclaration::new("foo").with_max(5.0).unwrap();
    let template: TemplatePtr = Arc::new(RepetitionPulseTemplate::new(ramp(), declaration));

    let error = build(
        template,
        constant_parameters([("a", 1.0), ("b", 1.0), ("foo", 9.0)]),
        ConditionMap::new(),
    )
    .unwrap_err();

    assert_eq!(
        error,
        SequencingError::Parameter(ParameterError::IllegalValue {
            name: "foo".to_string(),
            value: 9.0,
            min: None,
            max: Some(5.0),
        })
    );
}

#[test]
fn an_unarmed_trigger_defers_and_arming_lets_a_retry_complete() {
    let declaration = ParameterDeclaration::new("foo");
    let template: TemplatePtr = Arc::new(RepetitionPulseTemplate::new(ramp(), declaration));

    let trigger = Arc::new(HardwareCondition::new());
    let mut conditions = ConditionMap::new();
    conditions.insert("foo".to_string(), trigger.clone());
    let parameters = constant_parameters([("a", 1.0), ("b", 1.0), ("foo", 2.0)]);

    let deferred = match build(template, parameters, conditions).unwrap() {
        Sequenced::Deferred(sequencer) => sequencer,
        Sequenced::Complete(_) => panic!("expected a deferred pass"),
    };
    assert!(!deferred.has_finished());

    trigger.arm_trigger();
    let sequence = match deferred.build().unwrap() {
        Sequenced::Complete(sequence) => sequence,
        Sequenced::Deferred(_) => panic!("expected the retry to complete"),
    };

    match &sequence.root().instructions()[0] {
        Instruction::RepeatJump(repeat_jump) => assert_eq!(repeat_jump.count, 2),
        other => panic!("expected a RepeatJump, got {other}"),
    }
}

#[test]
fn identical_inputs_compile_to_identical_artifacts() {
    let make = || -> TemplatePtr {
        let inner = Arc::new(RepetitionPulseTemplate::new(ramp(), 3u64));
        Arc::new(RepetitionPulseTemplate::new(inner, 2u64))
    };
    let parameters = || constant_parameters([("a", 1.5), ("b", 2.0)]);

    let first = complete(make(), parameters(), ConditionMap::new());
    let second = complete(make(), parameters(), ConditionMap::new());
    assert_eq!(first, second);
}

#[test]
fn artifacts_print_as_mnemonic_text() {
    let template: TemplatePtr = Arc::new(RepetitionPulseTemplate::new(ramp(), 2u64));
    let sequence = complete(
        template,
        constant_parameters([("a", 1.0), ("b", 4.0)]),
        ConditionMap::new(),
    );

    let text = sequence.to_string();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "block 0:");
    assert_eq!(lines[1], "    REPJ 2 @1:0");
    assert_eq!(lines[2], "    STOP");
    assert_eq!(lines[3], "block 1:");
    assert!(lines[4].starts_with("    EXEC"));
}

#[test]
fn one_body_template_may_serve_several_combinators() {
    let shared = ramp();
    let template: TemplatePtr = Arc::new(RepetitionPulseTemplate::new(
        Arc::new(RepetitionPulseTemplate::new(shared.clone(), 2u64)),
        4u64,
    ));
    let again: TemplatePtr = Arc::new(RepetitionPulseTemplate::new(shared, 5u64));

    let parameters = constant_parameters([("a", 1.0), ("b", 1.0)]);

    let mut sequencer = Sequencer::new();
    sequencer.push(template, parameters.clone(), ConditionMap::new());
    sequencer.push(again, parameters, ConditionMap::new());
    let sequence = match sequencer.build().unwrap() {
        Sequenced::Complete(sequence) => sequence,
        Sequenced::Deferred(_) => panic!("expected a complete pass"),
    };

    // Two repeat jumps in the root, three embedded blocks in total.
    assert_eq!(sequence.root().embedded_blocks().len(), 2);
    assert_eq!(sequence.block_count(), 4);
}
