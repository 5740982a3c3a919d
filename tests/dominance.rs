//! Property tests for the control-flow analyses over randomly generated graphs.
//!
//! Graphs are described by successor lists: block 0 is the entry, a block with no
//! successors returns, one successor is a jump, and more become a switch. Edit
//! sequences mix flow rewiring with instruction and block-parameter edits.

use std::sync::Arc;

use proptest::prelude::*;
use rustc_hash::FxHashSet;

use flowir::{
    analysis::{
        BasicBlockPredecessors, BlockReachability, BlockReachabilityAnalysis, DominatorTree,
        DominatorTreeAnalysis, EffectfulInstructionAnalysis, EffectfulInstructions,
        FlowGraphAnalysis, PredecessorAnalysis, ValueUseAnalysis, ValueUses,
    },
    ir::{
        ArithmeticOp, BasicBlockTag, BlockFlow, Branch, Constant, FlowGraph, FlowGraphBuilder,
        Instruction, SwitchCase, SwitchFlow, Type, ValueTag,
    },
};

type Successors = Vec<Vec<usize>>;

fn cfg_strategy() -> impl Strategy<Value = Successors> {
    (2usize..10).prop_flat_map(|n| prop::collection::vec(prop::collection::vec(0..n, 0..=2), n))
}

fn cfg_with_edits() -> impl Strategy<Value = (Successors, Vec<(usize, Vec<usize>)>)> {
    (2usize..10).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::collection::vec(0..n, 0..=2), n),
            prop::collection::vec((0..n, prop::collection::vec(0..n, 0..=3)), 1..5),
        )
    })
}

fn flow_to(targets: &[usize], tags: &[BasicBlockTag]) -> BlockFlow {
    match targets {
        [] => BlockFlow::Return(Instruction::default_constant(Type::int32())),
        [only] => BlockFlow::jump(tags[*only].clone()),
        [first, rest @ ..] => BlockFlow::Switch(SwitchFlow::new(
            Instruction::default_constant(Type::int32()),
            rest.iter()
                .zip(1..)
                .map(|(target, value)| {
                    SwitchCase::new(vec![Constant::i32(value)], Branch::new(tags[*target].clone()))
                })
                .collect(),
            Branch::new(tags[*first].clone()),
        )),
    }
}

fn build(successors: &Successors) -> (FlowGraph, Vec<BasicBlockTag>) {
    let mut builder = FlowGraph::new().to_builder();
    let mut tags = vec![builder.entry_point_tag().clone()];
    for index in 1..successors.len() {
        tags.push(builder.add_basic_block(format!("b{}", index)).unwrap());
    }
    for (index, targets) in successors.iter().enumerate() {
        builder.set_flow(&tags[index], flow_to(targets, &tags)).unwrap();
    }
    (builder.build(), tags)
}

/// Blocks reachable from the entry when `removed` is deleted from the graph.
fn reachable_without(successors: &Successors, removed: Option<usize>) -> Vec<bool> {
    let mut seen = vec![false; successors.len()];
    if removed == Some(0) {
        return seen;
    }
    seen[0] = true;
    let mut stack = vec![0];
    while let Some(block) = stack.pop() {
        for &target in &successors[block] {
            if Some(target) != removed && !seen[target] {
                seen[target] = true;
                stack.push(target);
            }
        }
    }
    seen
}

fn apply_edits(builder: &mut FlowGraphBuilder, tags: &[BasicBlockTag], edits: &[(usize, Vec<usize>)]) {
    for (block, targets) in edits {
        builder.set_flow(&tags[*block], flow_to(targets, tags)).unwrap();
    }
}

/// One edit of a random edit sequence. Indices are reduced modulo whatever they pick
/// from when the edit is applied.
#[derive(Debug, Clone)]
enum Edit {
    Rewire { block: usize, targets: Vec<usize> },
    Insert { block: usize, position: usize, kind: u8 },
    Replace { victim: usize, kind: u8 },
    Remove { victim: usize },
    AddParameter { block: usize },
    RemoveParameter { victim: usize },
}

fn edit_strategy(n: usize) -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0..n, prop::collection::vec(0..n, 0..=3))
            .prop_map(|(block, targets)| Edit::Rewire { block, targets }),
        (0..n, any::<usize>(), 0u8..6)
            .prop_map(|(block, position, kind)| Edit::Insert { block, position, kind }),
        (any::<usize>(), 0u8..6).prop_map(|(victim, kind)| Edit::Replace { victim, kind }),
        any::<usize>().prop_map(|victim| Edit::Remove { victim }),
        (0..n).prop_map(|block| Edit::AddParameter { block }),
        any::<usize>().prop_map(|victim| Edit::RemoveParameter { victim }),
    ]
}

fn cfg_with_mixed_edits() -> impl Strategy<Value = (Successors, Vec<Edit>)> {
    (2usize..8).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::collection::vec(0..n, 0..=2), n),
            prop::collection::vec(edit_strategy(n), 1..16),
        )
    })
}

/// Values defined in the entry block that inserted instructions refer to. They are
/// never removed, so no edit leaves a dangling use behind.
struct Pool {
    tags: Vec<BasicBlockTag>,
    x: ValueTag,
    slot: ValueTag,
    one: ValueTag,
}

fn build_with_pool(successors: &Successors) -> (FlowGraph, Pool) {
    let int = Type::int32();
    let mut builder = FlowGraph::new().to_builder();
    let entry = builder.entry_point_tag().clone();
    let x = builder.append_parameter(&entry, int.clone(), "x").unwrap();
    let slot = builder.append_instruction(&entry, Instruction::alloca(int.clone()), "slot").unwrap();
    let one = builder
        .append_instruction(&entry, Instruction::constant(Constant::i32(1), int), "one")
        .unwrap();

    let mut tags = vec![entry];
    for index in 1..successors.len() {
        tags.push(builder.add_basic_block(format!("b{}", index)).unwrap());
    }
    for (index, targets) in successors.iter().enumerate() {
        builder.set_flow(&tags[index], flow_to(targets, &tags)).unwrap();
    }
    (builder.build(), Pool { tags, x, slot, one })
}

/// Pure, throwing, reading and writing instructions over the pool.
fn pool_instruction(pool: &Pool, kind: u8) -> Instruction {
    let int = Type::int32();
    let operands = vec![pool.x.clone(), pool.one.clone()];
    match kind {
        0 => Instruction::constant(Constant::i32(7), int),
        1 => Instruction::copy(int, pool.x.clone()),
        2 => Instruction::arithmetic(ArithmeticOp::Add, int.clone(), int, operands),
        3 => Instruction::arithmetic(ArithmeticOp::Divide, int.clone(), int, operands),
        4 => Instruction::store(int, pool.slot.clone(), pool.x.clone()),
        _ => Instruction::load(int, pool.slot.clone()),
    }
}

/// Like [`flow_to`], but every branch passes `x` to each parameter of its target.
fn flow_with_arguments(graph: &FlowGraph, pool: &Pool, targets: &[usize]) -> BlockFlow {
    let flow = flow_to(targets, &pool.tags);
    let branches = flow
        .branches()
        .into_iter()
        .map(|branch| {
            let count = graph
                .get_basic_block(&branch.target)
                .map_or(0, |block| block.parameters().len());
            Branch::with_values(branch.target.clone(), vec![pool.x.clone(); count])
        })
        .collect();
    flow.with_branches(branches)
}

fn apply_mixed_edits(builder: &mut FlowGraphBuilder, pool: &Pool, edits: &[Edit]) {
    let mut extras: Vec<ValueTag> = Vec::new();
    let mut parameters: Vec<ValueTag> = Vec::new();
    for edit in edits {
        match edit {
            Edit::Rewire { block, targets } => {
                let flow = flow_with_arguments(builder.graph(), pool, targets);
                builder.set_flow(&pool.tags[*block], flow).unwrap();
            }
            Edit::Insert { block, position, kind } => {
                let tag = &pool.tags[*block];
                let len = builder.graph().basic_block(tag).unwrap().instruction_tags().len();
                let extra = builder
                    .insert_instruction(tag, position % (len + 1), pool_instruction(pool, *kind), "extra")
                    .unwrap();
                extras.push(extra);
            }
            Edit::Replace { victim, kind } if !extras.is_empty() => {
                let extra = &extras[victim % extras.len()];
                builder.replace_instruction(extra, pool_instruction(pool, *kind)).unwrap();
            }
            Edit::Remove { victim } if !extras.is_empty() => {
                let extra = extras.swap_remove(victim % extras.len());
                builder.remove_instruction(&extra).unwrap();
            }
            Edit::AddParameter { block } => {
                let param = builder
                    .append_parameter(&pool.tags[*block], Type::int32(), "extra")
                    .unwrap();
                parameters.push(param);
            }
            Edit::RemoveParameter { victim } if !parameters.is_empty() => {
                let mut dead = FxHashSet::default();
                dead.insert(parameters.swap_remove(victim % parameters.len()));
                builder.remove_definitions(&dead).unwrap();
            }
            _ => {}
        }
    }
}

proptest! {
    #[test]
    fn test_dominance_matches_path_definition(successors in cfg_strategy()) {
        let (graph, tags) = build(&successors);
        let tree = graph.get_analysis_result::<DominatorTree>().unwrap();
        let reachable = reachable_without(&successors, None);

        for x in (0..tags.len()).filter(|&x| reachable[x]) {
            let without: Vec<bool> = reachable_without(&successors, Some(x));
            for y in (0..tags.len()).filter(|&y| reachable[y]) {
                // x dominates y iff y becomes unreachable once x is gone.
                let expected = x == y || !without[y];
                prop_assert_eq!(tree.is_dominated_by(&tags[y], &tags[x]), expected);
            }
        }
    }

    #[test]
    fn test_dominance_is_antisymmetric_and_transitive(successors in cfg_strategy()) {
        let (graph, tags) = build(&successors);
        let tree = graph.get_analysis_result::<DominatorTree>().unwrap();
        let reachability = graph.get_analysis_result::<BlockReachability>().unwrap();
        let reachable: Vec<&BasicBlockTag> =
            tags.iter().filter(|tag| reachability.is_reachable(tag)).collect();

        for &x in &reachable {
            prop_assert!(tree.is_dominated_by(x, graph.entry_point_tag()));
            for &y in &reachable {
                if tree.is_dominated_by(x, y) && tree.is_dominated_by(y, x) {
                    prop_assert_eq!(x, y);
                }
                for &z in &reachable {
                    if tree.is_dominated_by(x, y) && tree.is_dominated_by(y, z) {
                        prop_assert!(tree.is_dominated_by(x, z));
                    }
                }
            }
        }
        prop_assert_eq!(tree.get_immediate_dominator(graph.entry_point_tag()), None);
    }

    #[test]
    fn test_reachability_matches_search(successors in cfg_strategy()) {
        let (graph, tags) = build(&successors);
        let reachability = graph.get_analysis_result::<BlockReachability>().unwrap();
        let reachable = reachable_without(&successors, None);

        prop_assert_eq!(reachability.reachable_count(), reachable.iter().filter(|&&r| r).count());
        for (tag, &expected) in tags.iter().zip(&reachable) {
            prop_assert_eq!(reachability.is_reachable(tag), expected);
        }
        prop_assert_eq!(reachability.get_distance(graph.entry_point_tag()), Some(0));
    }

    #[test]
    fn test_control_flow_analyses_survive_rewiring((successors, edits) in cfg_with_edits()) {
        let (graph, tags) = build(&successors);

        let mut builder = graph.to_builder();
        apply_edits(&mut builder, &tags, &edits);
        let (edited, updates) = builder.build_with_updates();

        let previous = Arc::new(PredecessorAnalysis.analyze(&graph).unwrap());
        let patched = PredecessorAnalysis.analyze_with_updates(&edited, &previous, &updates).unwrap();
        prop_assert_eq!(&*patched, &PredecessorAnalysis.analyze(&edited).unwrap());

        let previous = Arc::new(DominatorTreeAnalysis.analyze(&graph).unwrap());
        let patched = DominatorTreeAnalysis.analyze_with_updates(&edited, &previous, &updates).unwrap();
        prop_assert_eq!(&*patched, &DominatorTreeAnalysis.analyze(&edited).unwrap());

        let previous = Arc::new(BlockReachabilityAnalysis.analyze(&graph).unwrap());
        let patched = BlockReachabilityAnalysis.analyze_with_updates(&edited, &previous, &updates).unwrap();
        prop_assert_eq!(&*patched, &BlockReachabilityAnalysis.analyze(&edited).unwrap());

        // Through the cache: materialize on the original, derive on a fresh edit.
        let _ = graph.get_analysis_result::<BasicBlockPredecessors>().unwrap();
        let _ = graph.get_analysis_result::<DominatorTree>().unwrap();
        let mut builder = graph.to_builder();
        apply_edits(&mut builder, &tags, &edits);
        let derived = builder.build();
        prop_assert_eq!(
            &*derived.get_analysis_result::<BasicBlockPredecessors>().unwrap(),
            &BasicBlockPredecessors::from_graph(&derived)
        );
        prop_assert_eq!(
            &*derived.get_analysis_result::<DominatorTree>().unwrap(),
            &DominatorTreeAnalysis.analyze(&derived).unwrap()
        );
    }

    #[test]
    fn test_use_and_effect_analyses_survive_mixed_edits((successors, edits) in cfg_with_mixed_edits()) {
        let (graph, pool) = build_with_pool(&successors);
        let mut builder = graph.to_builder();
        apply_mixed_edits(&mut builder, &pool, &edits);
        let (edited, updates) = builder.build_with_updates();

        let previous = Arc::new(ValueUseAnalysis.analyze(&graph).unwrap());
        let patched = ValueUseAnalysis.analyze_with_updates(&edited, &previous, &updates).unwrap();
        prop_assert_eq!(&*patched, &ValueUseAnalysis.analyze(&edited).unwrap());

        let previous = Arc::new(EffectfulInstructionAnalysis.analyze(&graph).unwrap());
        let patched = EffectfulInstructionAnalysis
            .analyze_with_updates(&edited, &previous, &updates)
            .unwrap();
        prop_assert_eq!(&*patched, &EffectfulInstructionAnalysis.analyze(&edited).unwrap());

        let previous = Arc::new(PredecessorAnalysis.analyze(&graph).unwrap());
        let patched = PredecessorAnalysis.analyze_with_updates(&edited, &previous, &updates).unwrap();
        prop_assert_eq!(&*patched, &PredecessorAnalysis.analyze(&edited).unwrap());

        // Through the cache, on a base graph nothing above has touched.
        let (graph, pool) = build_with_pool(&successors);
        let _ = graph.get_analysis_result::<ValueUses>().unwrap();
        let _ = graph.get_analysis_result::<EffectfulInstructions>().unwrap();
        let mut builder = graph.to_builder();
        apply_mixed_edits(&mut builder, &pool, &edits);
        let derived = builder.build();
        prop_assert_eq!(
            &*derived.get_analysis_result::<ValueUses>().unwrap(),
            &ValueUseAnalysis.analyze(&derived).unwrap()
        );
        prop_assert_eq!(
            &*derived.get_analysis_result::<EffectfulInstructions>().unwrap(),
            &EffectfulInstructionAnalysis.analyze(&derived).unwrap()
        );
    }
}
