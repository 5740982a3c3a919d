//! Randomized semantic preservation checks.
//!
//! Programs keep their state in stack slots and branch on comparisons between slots,
//! the way a front end lowers them. Loops are back edges guarded by a shared `fuel`
//! slot that only ever decreases, so every generated program terminates. Each program
//! is interpreted on a few inputs before and after SSA construction, constant
//! propagation and the default pipeline, and all runs must agree.

mod common;

use proptest::prelude::*;

use flowir::{
    compiler::{AllocaToRegisterPass, ConstantPropagationPass, GraphPass, PassScheduler},
    ir::{ArithmeticOp, BasicBlockTag, BlockFlow, Branch, Constant, FlowGraph, Instruction, Type, ValueTag},
    Result,
};

use common::{branch_if, has_memory_instructions, interpret};

const INPUTS: [i32; 4] = [-7, 0, 1, 12];

/// How a slot starts out.
#[derive(Debug, Clone)]
enum Init {
    Parameter,
    Constant(i32),
    Uninitialized,
}

/// One statement of a block. Slot indices are reduced modulo the slot count.
#[derive(Debug, Clone)]
enum Op {
    Set { dest: usize, value: i32 },
    Add { dest: usize, a: usize, b: usize },
    Sub { dest: usize, a: usize, b: usize },
    Scale { dest: usize, a: usize, factor: i32 },
}

/// How a block ends. Targets are reduced into the forward or backward range.
#[derive(Debug, Clone)]
enum Exit {
    Jump { forward: usize },
    Branch { a: usize, b: usize, then: usize, otherwise: usize },
    Loop { back: usize, forward: usize },
}

#[derive(Debug, Clone)]
struct ProgramShape {
    inits: Vec<Init>,
    blocks: Vec<(Vec<Op>, Exit)>,
    fuel: i32,
    result: usize,
}

fn init_strategy() -> impl Strategy<Value = Init> {
    prop_oneof![
        Just(Init::Parameter),
        (-4i32..5).prop_map(Init::Constant),
        Just(Init::Uninitialized),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..8, -3i32..4).prop_map(|(dest, value)| Op::Set { dest, value }),
        (0usize..8, 0usize..8, 0usize..8).prop_map(|(dest, a, b)| Op::Add { dest, a, b }),
        (0usize..8, 0usize..8, 0usize..8).prop_map(|(dest, a, b)| Op::Sub { dest, a, b }),
        (0usize..8, 0usize..8, -2i32..3).prop_map(|(dest, a, factor)| Op::Scale { dest, a, factor }),
    ]
}

fn exit_strategy() -> impl Strategy<Value = Exit> {
    prop_oneof![
        any::<usize>().prop_map(|forward| Exit::Jump { forward }),
        (0usize..8, 0usize..8, any::<usize>(), any::<usize>())
            .prop_map(|(a, b, then, otherwise)| Exit::Branch { a, b, then, otherwise }),
        (any::<usize>(), any::<usize>()).prop_map(|(back, forward)| Exit::Loop { back, forward }),
    ]
}

fn program_strategy() -> impl Strategy<Value = ProgramShape> {
    (
        prop::collection::vec(init_strategy(), 1..4),
        prop::collection::vec((prop::collection::vec(op_strategy(), 0..4), exit_strategy()), 1..6),
        0i32..4,
        0usize..8,
    )
        .prop_map(|(inits, blocks, fuel, result)| ProgramShape {
            inits,
            blocks,
            fuel,
            result,
        })
}

/// Builds the program. Body blocks are numbered from 1; block `len + 1` returns the
/// result slot.
fn build_program(shape: &ProgramShape) -> Result<FlowGraph> {
    let int = Type::int32();
    let mut builder = FlowGraph::new().to_builder();
    let entry = builder.entry_point_tag().clone();
    let n = builder.append_parameter(&entry, int.clone(), "n")?;

    let mut slots = Vec::new();
    for (index, init) in shape.inits.iter().enumerate() {
        let slot = builder.append_instruction(&entry, Instruction::alloca(int.clone()), format!("s{}", index))?;
        let value = match init {
            Init::Parameter => Some(n.clone()),
            Init::Constant(value) => Some(builder.append_instruction(
                &entry,
                Instruction::constant(Constant::i32(*value), int.clone()),
                "init",
            )?),
            Init::Uninitialized => None,
        };
        if let Some(value) = value {
            builder.append_instruction(&entry, Instruction::store(int.clone(), slot.clone(), value), "init.set")?;
        }
        slots.push(slot);
    }
    let fuel = builder.append_instruction(&entry, Instruction::alloca(int.clone()), "fuel")?;
    let fuel_init = builder.append_instruction(
        &entry,
        Instruction::constant(Constant::i32(shape.fuel), int.clone()),
        "fuel.init",
    )?;
    builder.append_instruction(&entry, Instruction::store(int.clone(), fuel.clone(), fuel_init), "fuel.set")?;

    let mut blocks: Vec<BasicBlockTag> = vec![entry.clone()];
    for index in 1..=shape.blocks.len() {
        blocks.push(builder.add_basic_block(format!("b{}", index))?);
    }
    let exit = builder.add_basic_block("exit")?;
    blocks.push(exit.clone());
    builder.set_flow(&entry, BlockFlow::jump(blocks[1].clone()))?;

    let slot = |index: usize| slots[index % slots.len()].clone();
    let last = blocks.len() - 1;
    for (offset, (ops, end)) in shape.blocks.iter().enumerate() {
        let index = offset + 1;
        let block = blocks[index].clone();
        let forward = |target: usize| blocks[index + 1 + target % (last - index)].clone();

        for op in ops {
            let (dest, value) = match op {
                Op::Set { dest, value } => (
                    *dest,
                    builder.append_instruction(&block, Instruction::constant(Constant::i32(*value), int.clone()), "k")?,
                ),
                Op::Add { dest, a, b } | Op::Sub { dest, a, b } => {
                    let op = match op {
                        Op::Add { .. } => ArithmeticOp::Add,
                        _ => ArithmeticOp::Subtract,
                    };
                    let left = builder.append_instruction(&block, Instruction::load(int.clone(), slot(*a)), "l")?;
                    let right = builder.append_instruction(&block, Instruction::load(int.clone(), slot(*b)), "r")?;
                    let value = builder.append_instruction(
                        &block,
                        Instruction::arithmetic(op, int.clone(), int.clone(), vec![left, right]),
                        "v",
                    )?;
                    (*dest, value)
                }
                Op::Scale { dest, a, factor } => {
                    let left = builder.append_instruction(&block, Instruction::load(int.clone(), slot(*a)), "l")?;
                    let right = builder.append_instruction(
                        &block,
                        Instruction::constant(Constant::i32(*factor), int.clone()),
                        "f",
                    )?;
                    let value = builder.append_instruction(
                        &block,
                        Instruction::arithmetic(ArithmeticOp::Multiply, int.clone(), int.clone(), vec![left, right]),
                        "v",
                    )?;
                    (*dest, value)
                }
            };
            builder.append_instruction(&block, Instruction::store(int.clone(), slot(dest), value), "set")?;
        }

        let flow = match end {
            Exit::Jump { forward: target } => BlockFlow::jump(forward(*target)),
            Exit::Branch { a, b, then, otherwise } => {
                let left = builder.append_instruction(&block, Instruction::load(int.clone(), slot(*a)), "l")?;
                let right = builder.append_instruction(&block, Instruction::load(int.clone(), slot(*b)), "r")?;
                let less = builder.append_instruction(
                    &block,
                    Instruction::arithmetic(ArithmeticOp::IsLessThan, Type::Bool, int.clone(), vec![left, right]),
                    "less",
                )?;
                branch_if(less, Branch::new(forward(*then)), Branch::new(forward(*otherwise)))
            }
            Exit::Loop { back, forward: target } => {
                let remaining = spend_fuel(&mut builder, &block, &fuel)?;
                let header = blocks[1 + back % index].clone();
                branch_if(remaining, Branch::new(header), Branch::new(forward(*target)))
            }
        };
        builder.set_flow(&block, flow)?;
    }

    let result = builder.append_instruction(&exit, Instruction::load(int.clone(), slot(shape.result)), "result")?;
    builder.set_flow(&exit, BlockFlow::Return(Instruction::copy(int, result)))?;
    let graph = builder.build();
    graph.validate()?;
    Ok(graph)
}

/// `fuel = fuel - 1; fuel >= 0`
fn spend_fuel(
    builder: &mut flowir::ir::FlowGraphBuilder,
    block: &BasicBlockTag,
    fuel: &ValueTag,
) -> Result<ValueTag> {
    let int = Type::int32();
    let old = builder.append_instruction(block, Instruction::load(int.clone(), fuel.clone()), "fuel.old")?;
    let one = builder.append_instruction(block, Instruction::constant(Constant::i32(1), int.clone()), "one")?;
    let new = builder.append_instruction(
        block,
        Instruction::arithmetic(ArithmeticOp::Subtract, int.clone(), int.clone(), vec![old, one]),
        "fuel.new",
    )?;
    builder.append_instruction(block, Instruction::store(int.clone(), fuel.clone(), new.clone()), "fuel.set")?;
    let zero = builder.append_instruction(block, Instruction::default_constant(int.clone()), "zero")?;
    builder.append_instruction(
        block,
        Instruction::arithmetic(ArithmeticOp::IsGreaterThanOrEqualTo, Type::Bool, int, vec![new, zero]),
        "again",
    )
}

fn results(graph: &FlowGraph) -> Vec<Constant> {
    INPUTS
        .iter()
        .map(|&input| interpret(graph, &[Constant::i32(input)]))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn test_optimizations_preserve_results(shape in program_strategy()) {
        let graph = build_program(&shape).unwrap();
        let expected = results(&graph);

        let promoted = AllocaToRegisterPass::new().run(&graph).unwrap();
        promoted.validate().unwrap();
        prop_assert!(!has_memory_instructions(&promoted));
        prop_assert_eq!(&results(&promoted), &expected);

        let propagated = ConstantPropagationPass::new().run(&promoted).unwrap();
        propagated.validate().unwrap();
        prop_assert_eq!(&results(&propagated), &expected);

        let optimized = PassScheduler::default().optimize(&graph).unwrap();
        optimized.validate().unwrap();
        prop_assert_eq!(&results(&optimized), &expected);
    }

    #[test]
    fn test_constant_propagation_is_sound_on_slot_programs(shape in program_strategy()) {
        let graph = build_program(&shape).unwrap();
        let propagated = ConstantPropagationPass::new().run(&graph).unwrap();
        propagated.validate().unwrap();
        prop_assert_eq!(results(&propagated), results(&graph));
    }
}
