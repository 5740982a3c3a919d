//! End-to-end optimization scenarios.
//!
//! Each test builds a small graph, runs one pass or the default pipeline over it and
//! checks the exact shape of the result.

mod common;

use flowir::{
    compiler::{AllocaToRegisterPass, ConstantPropagationPass, GraphPass, PassScheduler},
    ir::{
        ArithmeticOp, BasicBlockTag, BlockFlow, Branch, Constant, FlowGraph, Instruction,
        SwitchCase, SwitchFlow, Type,
    },
    Result,
};

use common::{has_memory_instructions, interpret};

fn returned_constant(graph: &FlowGraph, block: &BasicBlockTag) -> Option<Constant> {
    match graph.basic_block(block).ok()?.flow() {
        BlockFlow::Return(value) => value.prototype().as_constant().cloned(),
        _ => None,
    }
}

/// `entry: a = alloca(i32); store(a, 41); t = load(a); b = add(t, 1); return b`
fn store_then_load() -> Result<FlowGraph> {
    let int = Type::int32();
    let mut builder = FlowGraph::new().to_builder();
    let entry = builder.entry_point_tag().clone();
    let a = builder.append_instruction(&entry, Instruction::alloca(int.clone()), "a")?;
    let c41 = builder.append_instruction(&entry, Instruction::constant(Constant::i32(41), int.clone()), "c41")?;
    builder.append_instruction(&entry, Instruction::store(int.clone(), a.clone(), c41), "s")?;
    let t = builder.append_instruction(&entry, Instruction::load(int.clone(), a), "t")?;
    let one = builder.append_instruction(&entry, Instruction::constant(Constant::i32(1), int.clone()), "one")?;
    let b = builder.append_instruction(
        &entry,
        Instruction::arithmetic(ArithmeticOp::Add, int.clone(), int.clone(), vec![t, one]),
        "b",
    )?;
    builder.set_flow(&entry, BlockFlow::Return(Instruction::copy(int, b)))?;
    Ok(builder.build())
}

#[test]
fn test_store_then_load_folds_to_constant_return() -> Result<()> {
    let graph = store_then_load()?;

    let promoted = AllocaToRegisterPass::new().run(&graph)?;
    let propagated = ConstantPropagationPass::new().run(&promoted)?;
    assert!(!has_memory_instructions(&propagated));
    assert_eq!(
        returned_constant(&propagated, propagated.entry_point_tag()),
        Some(Constant::i32(42))
    );
    propagated.validate()?;

    let optimized = PassScheduler::default().optimize(&graph)?;
    assert!(optimized.named_instructions().is_empty());
    assert_eq!(optimized.block_count(), 1);
    assert_eq!(
        returned_constant(&optimized, optimized.entry_point_tag()),
        Some(Constant::i32(42))
    );
    Ok(())
}

#[test]
fn test_diamond_parameter_folds_to_constant() -> Result<()> {
    let int = Type::int32();
    let mut builder = FlowGraph::new().to_builder();
    let entry = builder.entry_point_tag().clone();
    let left = builder.add_basic_block("L")?;
    let right = builder.add_basic_block("R")?;
    let join = builder.add_basic_block("join")?;

    let flag = builder.append_parameter(&entry, Type::Bool, "flag")?;
    builder.set_flow(
        &entry,
        BlockFlow::Switch(SwitchFlow::new(
            Instruction::copy(Type::Bool, flag),
            vec![SwitchCase::new(vec![Constant::Bool(true)], Branch::new(left.clone()))],
            Branch::new(right.clone()),
        )),
    )?;
    let one_left = builder.append_instruction(&left, Instruction::constant(Constant::i32(1), int.clone()), "one")?;
    builder.set_flow(&left, BlockFlow::Jump(Branch::with_values(join.clone(), vec![one_left])))?;
    let one_right = builder.append_instruction(&right, Instruction::constant(Constant::i32(1), int.clone()), "one")?;
    builder.set_flow(&right, BlockFlow::Jump(Branch::with_values(join.clone(), vec![one_right])))?;
    let p = builder.append_parameter(&join, int.clone(), "p")?;
    builder.set_flow(&join, BlockFlow::Return(Instruction::copy(int, p.clone())))?;
    let graph = builder.build();

    let propagated = ConstantPropagationPass::new().run(&graph)?;
    propagated.validate()?;
    assert!(!propagated.contains_parameter(&p));
    assert!(propagated.basic_block(&join)?.parameters().is_empty());
    assert_eq!(returned_constant(&propagated, &join), Some(Constant::i32(1)));
    for value in [true, false] {
        assert_eq!(interpret(&propagated, &[Constant::Bool(value)]), Constant::i32(1));
    }
    Ok(())
}

#[test]
fn test_constant_switch_becomes_jump() -> Result<()> {
    let int = Type::int32();
    let mut builder = FlowGraph::new().to_builder();
    let entry = builder.entry_point_tag().clone();
    let a = builder.add_basic_block("A")?;
    let b = builder.add_basic_block("B")?;
    let c = builder.add_basic_block("C")?;

    builder.set_flow(
        &entry,
        BlockFlow::Switch(SwitchFlow::new(
            Instruction::constant(Constant::i32(2), int.clone()),
            vec![
                SwitchCase::new(vec![Constant::i32(1)], Branch::new(a.clone())),
                SwitchCase::new(vec![Constant::i32(2)], Branch::new(b.clone())),
            ],
            Branch::new(c.clone()),
        )),
    )?;
    for (block, value) in [(&a, 10), (&b, 20), (&c, 30)] {
        builder.set_flow(block, BlockFlow::Return(Instruction::constant(Constant::i32(value), int.clone())))?;
    }
    let graph = builder.build();

    let propagated = ConstantPropagationPass::new().run(&graph)?;
    assert_eq!(
        propagated.entry_point()?.flow(),
        &BlockFlow::Jump(Branch::new(b.clone()))
    );
    assert_eq!(propagated.basic_block(&a)?.flow(), &BlockFlow::Unreachable);
    assert_eq!(propagated.basic_block(&c)?.flow(), &BlockFlow::Unreachable);

    let optimized = PassScheduler::default().optimize(&graph)?;
    optimized.validate()?;
    assert!(!optimized.contains_basic_block(&a));
    assert!(!optimized.contains_basic_block(&c));
    assert!(optimized.contains_basic_block(&b));
    assert_eq!(optimized.block_count(), 2);
    assert_eq!(interpret(&optimized, &[]), Constant::i32(20));
    Ok(())
}

#[test]
fn test_optimize_all_handles_every_scenario() -> Result<()> {
    let graphs = vec![store_then_load()?, common::distance_program()?, common::sum_below_program()?];
    let optimized = PassScheduler::default().optimize_all(&graphs)?;

    assert_eq!(optimized.len(), graphs.len());
    assert_eq!(interpret(&optimized[0], &[]), Constant::i32(42));
    assert_eq!(
        interpret(&optimized[1], &[Constant::i32(2), Constant::i32(9)]),
        Constant::i32(7)
    );
    assert_eq!(interpret(&optimized[2], &[Constant::i32(4)]), Constant::i32(6));
    Ok(())
}
