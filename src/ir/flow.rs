//! Block terminators: jumps, switches, returns, try flows and unreachable.
//!
//! Every basic block ends in exactly one [`BlockFlow`]. A flow may carry anonymous
//! instructions (evaluated at the end of the block, after all named instructions) and
//! a list of [`Branch`]es. A branch names its target block and supplies one
//! [`BranchArgument`] per target block parameter.

use std::fmt;

use crate::ir::{
    constant::Constant,
    instruction::Instruction,
    tag::{BasicBlockTag, ValueTag},
    update::MemberMapping,
};

/// A single argument passed along a branch to a block parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BranchArgument {
    /// An ordinary value.
    Value(ValueTag),
    /// The result of the instruction guarded by a try flow.
    TryResult,
    /// The exception thrown by the instruction guarded by a try flow.
    TryException,
}

impl BranchArgument {
    /// Returns the value if this argument is an ordinary value.
    #[must_use]
    pub const fn as_value(&self) -> Option<&ValueTag> {
        match self {
            BranchArgument::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Returns `true` if this is an ordinary value argument.
    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, BranchArgument::Value(_))
    }
}

impl From<ValueTag> for BranchArgument {
    fn from(value: ValueTag) -> Self {
        BranchArgument::Value(value)
    }
}

impl fmt::Display for BranchArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchArgument::Value(value) => write!(f, "{}", value),
            BranchArgument::TryResult => write!(f, "#result"),
            BranchArgument::TryException => write!(f, "#exception"),
        }
    }
}

/// A control transfer to a block, passing arguments to its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Branch {
    /// The target block.
    pub target: BasicBlockTag,
    /// One argument per target block parameter.
    pub arguments: Vec<BranchArgument>,
}

impl Branch {
    /// Creates a branch with no arguments.
    #[must_use]
    pub fn new(target: BasicBlockTag) -> Self {
        Self {
            target,
            arguments: Vec::new(),
        }
    }

    /// Creates a branch passing ordinary values.
    #[must_use]
    pub fn with_values(target: BasicBlockTag, values: Vec<ValueTag>) -> Self {
        Self {
            target,
            arguments: values.into_iter().map(BranchArgument::Value).collect(),
        }
    }

    /// Creates a branch from arbitrary arguments.
    #[must_use]
    pub fn with_arguments(target: BasicBlockTag, arguments: Vec<BranchArgument>) -> Self {
        Self { target, arguments }
    }

    /// Returns a copy of this branch with one more argument appended.
    #[must_use]
    pub fn add_argument(&self, argument: BranchArgument) -> Self {
        let mut arguments = self.arguments.clone();
        arguments.push(argument);
        Self {
            target: self.target.clone(),
            arguments,
        }
    }

    /// Iterates over the ordinary values passed along this branch.
    pub fn values(&self) -> impl Iterator<Item = &ValueTag> {
        self.arguments.iter().filter_map(BranchArgument::as_value)
    }

    fn map_values(&self, map: &mut dyn FnMut(&ValueTag) -> ValueTag) -> Self {
        Self {
            target: self.target.clone(),
            arguments: self
                .arguments
                .iter()
                .map(|arg| match arg {
                    BranchArgument::Value(value) => BranchArgument::Value(map(value)),
                    other => other.clone(),
                })
                .collect(),
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.target)?;
        for (index, arg) in self.arguments.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

/// A switch case: a set of constants that all transfer control to one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCase {
    /// The constants that select this case.
    pub values: Vec<Constant>,
    /// The branch taken when the scrutinee matches one of `values`.
    pub branch: Branch,
}

impl SwitchCase {
    /// Creates a switch case.
    #[must_use]
    pub fn new(values: Vec<Constant>, branch: Branch) -> Self {
        Self { values, branch }
    }
}

/// A multi-way branch on the value of an anonymous instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchFlow {
    /// The instruction whose result selects the branch.
    pub value: Instruction,
    /// The cases, in order. The first case containing the scrutinee wins.
    pub cases: Vec<SwitchCase>,
    /// The branch taken when no case matches.
    pub default: Branch,
}

impl SwitchFlow {
    /// Creates a switch flow.
    #[must_use]
    pub fn new(value: Instruction, cases: Vec<SwitchCase>, default: Branch) -> Self {
        Self {
            value,
            cases,
            default,
        }
    }

    /// Returns the branch taken for a constant scrutinee.
    #[must_use]
    pub fn branch_for(&self, value: &Constant) -> &Branch {
        self.cases
            .iter()
            .find(|case| case.values.contains(value))
            .map_or(&self.default, |case| &case.branch)
    }
}

/// A flow that runs an instruction and branches on whether it threw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryFlow {
    /// The guarded instruction.
    pub instruction: Instruction,
    /// Taken when the instruction completes normally.
    pub success: Branch,
    /// Taken when the instruction throws.
    pub exception: Branch,
}

/// The terminator of a basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockFlow {
    /// Unconditional jump.
    Jump(Branch),
    /// Multi-way branch.
    Switch(SwitchFlow),
    /// Return the result of an anonymous instruction.
    Return(Instruction),
    /// Exception-aware call-like flow.
    Try(TryFlow),
    /// Control never reaches the end of this block.
    Unreachable,
}

impl BlockFlow {
    /// Convenience constructor for a jump without arguments.
    #[must_use]
    pub fn jump(target: BasicBlockTag) -> Self {
        BlockFlow::Jump(Branch::new(target))
    }

    /// Returns the anonymous instructions this flow evaluates, in order.
    #[must_use]
    pub fn instructions(&self) -> Vec<&Instruction> {
        match self {
            BlockFlow::Jump(_) | BlockFlow::Unreachable => Vec::new(),
            BlockFlow::Switch(switch) => vec![&switch.value],
            BlockFlow::Return(value) => vec![value],
            BlockFlow::Try(flow) => vec![&flow.instruction],
        }
    }

    /// Returns the branches of this flow, in order. Switch cases come before the default.
    #[must_use]
    pub fn branches(&self) -> Vec<&Branch> {
        match self {
            BlockFlow::Jump(branch) => vec![branch],
            BlockFlow::Switch(switch) => switch
                .cases
                .iter()
                .map(|case| &case.branch)
                .chain(std::iter::once(&switch.default))
                .collect(),
            BlockFlow::Return(_) | BlockFlow::Unreachable => Vec::new(),
            BlockFlow::Try(flow) => vec![&flow.success, &flow.exception],
        }
    }

    /// Returns the distinct branch targets of this flow, in first-seen order.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<BasicBlockTag> {
        let mut targets: Vec<BasicBlockTag> = Vec::new();
        for branch in self.branches() {
            if !targets.contains(&branch.target) {
                targets.push(branch.target.clone());
            }
        }
        targets
    }

    /// Replaces the anonymous instructions, in the order [`BlockFlow::instructions`] lists them.
    ///
    /// # Panics
    ///
    /// Panics if `instructions` does not have exactly as many entries as the flow carries.
    #[must_use]
    pub fn with_instructions(&self, instructions: Vec<Instruction>) -> Self {
        let expected = self.instructions().len();
        assert_eq!(
            instructions.len(),
            expected,
            "flow instruction count mismatch"
        );
        let mut iter = instructions.into_iter();
        match self {
            BlockFlow::Jump(_) | BlockFlow::Unreachable => self.clone(),
            BlockFlow::Switch(switch) => BlockFlow::Switch(SwitchFlow {
                value: iter.next().unwrap_or_else(|| switch.value.clone()),
                cases: switch.cases.clone(),
                default: switch.default.clone(),
            }),
            BlockFlow::Return(value) => {
                BlockFlow::Return(iter.next().unwrap_or_else(|| value.clone()))
            }
            BlockFlow::Try(flow) => BlockFlow::Try(TryFlow {
                instruction: iter.next().unwrap_or_else(|| flow.instruction.clone()),
                success: flow.success.clone(),
                exception: flow.exception.clone(),
            }),
        }
    }

    /// Replaces the branches, in the order [`BlockFlow::branches`] lists them.
    ///
    /// # Panics
    ///
    /// Panics if `branches` does not have exactly as many entries as the flow carries.
    #[must_use]
    pub fn with_branches(&self, branches: Vec<Branch>) -> Self {
        let expected = self.branches().len();
        assert_eq!(branches.len(), expected, "flow branch count mismatch");
        let mut iter = branches.into_iter();
        let mut next = |old: &Branch| iter.next().unwrap_or_else(|| old.clone());
        match self {
            BlockFlow::Jump(branch) => BlockFlow::Jump(next(branch)),
            BlockFlow::Switch(switch) => {
                let cases = switch
                    .cases
                    .iter()
                    .map(|case| SwitchCase {
                        values: case.values.clone(),
                        branch: next(&case.branch),
                    })
                    .collect();
                BlockFlow::Switch(SwitchFlow {
                    value: switch.value.clone(),
                    cases,
                    default: next(&switch.default),
                })
            }
            BlockFlow::Return(_) | BlockFlow::Unreachable => self.clone(),
            BlockFlow::Try(flow) => BlockFlow::Try(TryFlow {
                instruction: flow.instruction.clone(),
                success: next(&flow.success),
                exception: next(&flow.exception),
            }),
        }
    }

    /// Rewrites every value this flow uses, in instructions and branch arguments alike.
    #[must_use]
    pub fn map_values(&self, mut map: impl FnMut(&ValueTag) -> ValueTag) -> Self {
        let instructions = self
            .instructions()
            .into_iter()
            .map(|insn| insn.map_arguments(&mut map))
            .collect();
        let branches = self
            .branches()
            .into_iter()
            .map(|branch| branch.map_values(&mut map))
            .collect();
        self.with_instructions(instructions).with_branches(branches)
    }

    /// Remaps the members of this flow's anonymous instructions.
    #[must_use]
    pub fn map_members(&self, mapping: &MemberMapping) -> Self {
        let instructions = self
            .instructions()
            .into_iter()
            .map(|insn| insn.map_members(mapping))
            .collect();
        self.with_instructions(instructions)
    }

    /// Iterates over every value this flow uses.
    #[must_use]
    pub fn used_values(&self) -> Vec<ValueTag> {
        let mut values: Vec<ValueTag> = Vec::new();
        for insn in self.instructions() {
            values.extend(insn.arguments().iter().cloned());
        }
        for branch in self.branches() {
            values.extend(branch.values().cloned());
        }
        values
    }
}

impl fmt::Display for BlockFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockFlow::Jump(branch) => write!(f, "jump {}", branch),
            BlockFlow::Switch(switch) => {
                write!(f, "switch {} {{", switch.value)?;
                for case in &switch.cases {
                    write!(f, " ")?;
                    for (index, value) in case.values.iter().enumerate() {
                        if index > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", value)?;
                    }
                    write!(f, " -> {};", case.branch)?;
                }
                write!(f, " default -> {} }}", switch.default)
            }
            BlockFlow::Return(value) => write!(f, "return {}", value),
            BlockFlow::Try(flow) => write!(
                f,
                "try {} then {} catch {}",
                flow.instruction, flow.success, flow.exception
            ),
            BlockFlow::Unreachable => write!(f, "unreachable"),
        }
    }
}
