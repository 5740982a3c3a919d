//! Shared helpers for the integration tests.
//!
//! [`interpret`] is a small reference interpreter used to check that optimized graphs
//! compute what their inputs computed. The `*_program` functions build the sample
//! programs the tests optimize; they use stack slots the way a front end would, leaving
//! SSA construction to the optimizer.

#![allow(dead_code)]

use std::collections::HashMap;

use flowir::{
    compiler::{ConstantEvaluator, DefaultEvaluator},
    ir::{
        ArithmeticOp, BlockFlow, Branch, BranchArgument, Constant, FlowGraph, Instruction,
        InstructionPrototype, SwitchCase, SwitchFlow, Type, ValueTag,
    },
    Result,
};

/// Upper bound on the number of blocks one interpretation may execute.
const FUEL: usize = 100_000;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A plain constant.
    Constant(Constant),
    /// The address of a stack slot.
    Slot(usize),
}

impl Value {
    fn into_constant(self) -> Constant {
        match self {
            Value::Constant(constant) => constant,
            Value::Slot(slot) => panic!("expected a constant, found slot #{}", slot),
        }
    }
}

/// Machine state of one interpretation.
///
/// Every `alloca` owns exactly one slot that survives repeated executions of the
/// `alloca`; that is the view SSA construction takes of a slot.
#[derive(Default)]
struct Machine {
    values: HashMap<ValueTag, Value>,
    slots: Vec<Constant>,
    slot_of: HashMap<ValueTag, usize>,
}

impl Machine {
    fn value(&self, tag: &ValueTag) -> Value {
        self.values
            .get(tag)
            .cloned()
            .unwrap_or_else(|| panic!("{} is used before it is defined", tag))
    }

    fn slot(&self, tag: &ValueTag) -> usize {
        match self.value(tag) {
            Value::Slot(slot) => slot,
            other => panic!("{} is not a pointer: {:?}", tag, other),
        }
    }

    fn execute(&mut self, tag: Option<&ValueTag>, instruction: &Instruction) -> Value {
        let args = instruction.arguments();
        match instruction.prototype() {
            InstructionPrototype::Alloca { element_type } => {
                let owner = tag.expect("alloca in a flow").clone();
                let slot = match self.slot_of.get(&owner) {
                    Some(&slot) => slot,
                    None => {
                        self.slots.push(Constant::default_for(element_type));
                        let slot = self.slots.len() - 1;
                        self.slot_of.insert(owner, slot);
                        slot
                    }
                };
                Value::Slot(slot)
            }
            InstructionPrototype::Load { .. } => {
                Value::Constant(self.slots[self.slot(&args[0])].clone())
            }
            InstructionPrototype::Store { .. } => {
                let slot = self.slot(&args[0]);
                let value = self.value(&args[1]).into_constant();
                self.slots[slot] = value.clone();
                Value::Constant(value)
            }
            InstructionPrototype::Copy { .. } => self.value(&args[0]),
            prototype => {
                let constants: Vec<Constant> = args
                    .iter()
                    .map(|arg| self.value(arg).into_constant())
                    .collect();
                let result = DefaultEvaluator
                    .evaluate(prototype, &constants)
                    .unwrap_or_else(|| panic!("cannot evaluate {:?}", prototype));
                Value::Constant(result)
            }
        }
    }
}

/// Runs `graph` on `arguments` and returns the value it returns.
///
/// # Panics
///
/// Panics on flows other than jumps, switches and returns, on branch arguments other
/// than plain values, and when the program does not terminate within a fixed budget.
pub fn interpret(graph: &FlowGraph, arguments: &[Constant]) -> Constant {
    let mut machine = Machine::default();
    let mut block = graph.entry_point().expect("entry point");
    let mut incoming: Vec<Value> = arguments.iter().cloned().map(Value::Constant).collect();

    for _ in 0..FUEL {
        assert_eq!(
            block.parameters().len(),
            incoming.len(),
            "argument count mismatch entering {}",
            block.tag()
        );
        for (param, value) in block.parameters().iter().zip(incoming.drain(..)) {
            machine.values.insert(param.tag.clone(), value);
        }
        for insn in block.named_instructions() {
            let value = machine.execute(Some(insn.tag()), insn.instruction());
            machine.values.insert(insn.tag().clone(), value);
        }

        let branch = match block.flow() {
            BlockFlow::Return(instruction) => {
                return machine.execute(None, instruction).into_constant();
            }
            BlockFlow::Jump(branch) => branch,
            BlockFlow::Switch(switch) => {
                let scrutinee = machine.execute(None, &switch.value).into_constant();
                switch.branch_for(&scrutinee)
            }
            other => panic!("unsupported flow {:?}", other),
        };
        incoming = branch
            .arguments
            .iter()
            .map(|arg| match arg {
                BranchArgument::Value(value) => machine.value(value),
                other => panic!("unsupported branch argument {:?}", other),
            })
            .collect();
        block = graph.basic_block(&branch.target).expect("branch target");
    }
    panic!("program did not terminate");
}

/// A two-way branch on a boolean value.
pub fn branch_if(condition: ValueTag, then: Branch, otherwise: Branch) -> BlockFlow {
    BlockFlow::Switch(SwitchFlow::new(
        Instruction::copy(Type::Bool, condition),
        vec![SwitchCase::new(vec![Constant::Bool(true)], then)],
        otherwise,
    ))
}

/// `fn(n) { sum = 0; i = 0; while i < n { sum += i; i += 1 } return sum }`
pub fn sum_below_program() -> Result<FlowGraph> {
    let int = Type::int32();
    let mut builder = FlowGraph::new().to_builder();
    let entry = builder.entry_point_tag().clone();
    let header = builder.add_basic_block("header")?;
    let body = builder.add_basic_block("body")?;
    let exit = builder.add_basic_block("exit")?;

    let n = builder.append_parameter(&entry, int.clone(), "n")?;
    let sum = builder.append_instruction(&entry, Instruction::alloca(int.clone()), "sum")?;
    let i = builder.append_instruction(&entry, Instruction::alloca(int.clone()), "i")?;
    let zero = builder.append_instruction(&entry, Instruction::default_constant(int.clone()), "zero")?;
    builder.append_instruction(&entry, Instruction::store(int.clone(), sum.clone(), zero.clone()), "sum.init")?;
    builder.append_instruction(&entry, Instruction::store(int.clone(), i.clone(), zero), "i.init")?;
    builder.set_flow(&entry, BlockFlow::jump(header.clone()))?;

    let i_now = builder.append_instruction(&header, Instruction::load(int.clone(), i.clone()), "i.now")?;
    let more = builder.append_instruction(
        &header,
        Instruction::arithmetic(ArithmeticOp::IsLessThan, Type::Bool, int.clone(), vec![i_now, n]),
        "more",
    )?;
    builder.set_flow(&header, branch_if(more, Branch::new(body.clone()), Branch::new(exit.clone())))?;

    let sum_old = builder.append_instruction(&body, Instruction::load(int.clone(), sum.clone()), "sum.old")?;
    let i_old = builder.append_instruction(&body, Instruction::load(int.clone(), i.clone()), "i.old")?;
    let sum_new = builder.append_instruction(
        &body,
        Instruction::arithmetic(ArithmeticOp::Add, int.clone(), int.clone(), vec![sum_old, i_old.clone()]),
        "sum.new",
    )?;
    builder.append_instruction(&body, Instruction::store(int.clone(), sum.clone(), sum_new), "sum.set")?;
    let one = builder.append_instruction(&body, Instruction::constant(Constant::i32(1), int.clone()), "one")?;
    let i_new = builder.append_instruction(
        &body,
        Instruction::arithmetic(ArithmeticOp::Add, int.clone(), int.clone(), vec![i_old, one]),
        "i.new",
    )?;
    builder.append_instruction(&body, Instruction::store(int.clone(), i, i_new), "i.set")?;
    builder.set_flow(&body, BlockFlow::jump(header))?;

    let result = builder.append_instruction(&exit, Instruction::load(int.clone(), sum), "result")?;
    builder.set_flow(&exit, BlockFlow::Return(Instruction::copy(int, result)))?;
    Ok(builder.build())
}

/// `fn(a, b) { r; if a < b { r = b - a } else { r = a - b } return r }`
pub fn distance_program() -> Result<FlowGraph> {
    let int = Type::int32();
    let mut builder = FlowGraph::new().to_builder();
    let entry = builder.entry_point_tag().clone();
    let less = builder.add_basic_block("less")?;
    let more = builder.add_basic_block("more")?;
    let join = builder.add_basic_block("join")?;

    let a = builder.append_parameter(&entry, int.clone(), "a")?;
    let b = builder.append_parameter(&entry, int.clone(), "b")?;
    let r = builder.append_instruction(&entry, Instruction::alloca(int.clone()), "r")?;
    let is_less = builder.append_instruction(
        &entry,
        Instruction::arithmetic(ArithmeticOp::IsLessThan, Type::Bool, int.clone(), vec![a.clone(), b.clone()]),
        "is_less",
    )?;
    builder.set_flow(&entry, branch_if(is_less, Branch::new(less.clone()), Branch::new(more.clone())))?;

    let up = builder.append_instruction(
        &less,
        Instruction::arithmetic(ArithmeticOp::Subtract, int.clone(), int.clone(), vec![b.clone(), a.clone()]),
        "up",
    )?;
    builder.append_instruction(&less, Instruction::store(int.clone(), r.clone(), up), "r.up")?;
    builder.set_flow(&less, BlockFlow::jump(join.clone()))?;

    let down = builder.append_instruction(
        &more,
        Instruction::arithmetic(ArithmeticOp::Subtract, int.clone(), int.clone(), vec![a, b]),
        "down",
    )?;
    builder.append_instruction(&more, Instruction::store(int.clone(), r.clone(), down), "r.down")?;
    builder.set_flow(&more, BlockFlow::jump(join.clone()))?;

    let result = builder.append_instruction(&join, Instruction::load(int.clone(), r), "result")?;
    builder.set_flow(&join, BlockFlow::Return(Instruction::copy(int, result)))?;
    Ok(builder.build())
}

/// A loop whose header is the entry block:
///
/// ```text
/// entry(n):
///   t = alloca<i32>
///   acc = load(t)
///   next = acc + n
///   store(t, next)
///   if n > 0 then body else exit
/// body:
///   m = n - 1
///   jump entry(m)
/// exit:
///   return load(t)
/// ```
///
/// The slot starts out zeroed, so the program computes `n + (n - 1) + ... + 0`.
pub fn entry_loop_program() -> Result<FlowGraph> {
    let int = Type::int32();
    let mut builder = FlowGraph::new().to_builder();
    let entry = builder.entry_point_tag().clone();
    let body = builder.add_basic_block("body")?;
    let exit = builder.add_basic_block("exit")?;

    let n = builder.append_parameter(&entry, int.clone(), "n")?;
    let t = builder.append_instruction(&entry, Instruction::alloca(int.clone()), "t")?;
    let acc = builder.append_instruction(&entry, Instruction::load(int.clone(), t.clone()), "acc")?;
    let next = builder.append_instruction(
        &entry,
        Instruction::arithmetic(ArithmeticOp::Add, int.clone(), int.clone(), vec![acc, n.clone()]),
        "next",
    )?;
    builder.append_instruction(&entry, Instruction::store(int.clone(), t.clone(), next), "t.set")?;
    let zero = builder.append_instruction(&entry, Instruction::default_constant(int.clone()), "zero")?;
    let positive = builder.append_instruction(
        &entry,
        Instruction::arithmetic(ArithmeticOp::IsGreaterThan, Type::Bool, int.clone(), vec![n.clone(), zero]),
        "positive",
    )?;
    builder.set_flow(&entry, branch_if(positive, Branch::new(body.clone()), Branch::new(exit.clone())))?;

    let one = builder.append_instruction(&body, Instruction::constant(Constant::i32(1), int.clone()), "one")?;
    let m = builder.append_instruction(
        &body,
        Instruction::arithmetic(ArithmeticOp::Subtract, int.clone(), int.clone(), vec![n, one]),
        "m",
    )?;
    builder.set_flow(&body, BlockFlow::Jump(Branch::with_values(entry, vec![m])))?;

    let result = builder.append_instruction(&exit, Instruction::load(int.clone(), t), "result")?;
    builder.set_flow(&exit, BlockFlow::Return(Instruction::copy(int, result)))?;
    Ok(builder.build())
}

/// Returns `true` if `graph` still contains stack slot traffic.
pub fn has_memory_instructions(graph: &FlowGraph) -> bool {
    graph.named_instructions().iter().any(|insn| {
        matches!(
            insn.prototype(),
            InstructionPrototype::Alloca { .. }
                | InstructionPrototype::Load { .. }
                | InstructionPrototype::Store { .. }
        )
    })
}
