//! The update log: a closed family of edits between two graph revisions.
//!
//! Whenever a new [`crate::ir::FlowGraph`] is derived from an old one, each primitive
//! edit is described by a [`FlowGraphUpdate`]. Analyses receive the list of updates that
//! separates the revision they last analyzed from the current one and decide, by
//! matching on it, whether they can patch their previous result or must start over.

use std::{fmt, sync::Arc};

use crate::ir::{
    instruction::Instruction,
    tag::{BasicBlockTag, ValueTag},
    types::{Method, Type},
};

type TypeMap = dyn Fn(&Type) -> Type + Send + Sync;
type MethodMap = dyn Fn(&Method) -> Method + Send + Sync;

/// A bulk rewrite of the types and methods a graph refers to.
///
/// Types are mapped structurally (pointer element types first); methods have their
/// signature types mapped and are then passed through the method map.
#[derive(Clone)]
pub struct MemberMapping {
    type_map: Arc<TypeMap>,
    method_map: Arc<MethodMap>,
}

impl MemberMapping {
    /// Creates a mapping from a type map and a method map.
    pub fn new(
        type_map: impl Fn(&Type) -> Type + Send + Sync + 'static,
        method_map: impl Fn(&Method) -> Method + Send + Sync + 'static,
    ) -> Self {
        Self {
            type_map: Arc::new(type_map),
            method_map: Arc::new(method_map),
        }
    }

    /// Creates a mapping that only rewrites types.
    pub fn from_types(type_map: impl Fn(&Type) -> Type + Send + Sync + 'static) -> Self {
        Self::new(type_map, Method::clone)
    }

    /// Maps a single (non-nested) type.
    #[must_use]
    pub fn map_type(&self, ty: &Type) -> Type {
        (self.type_map)(ty)
    }

    /// Maps a method, including its signature types.
    #[must_use]
    pub fn map_method(&self, method: &Method) -> Method {
        let retyped = method.map_types(&|ty: &Type| self.map_type(ty));
        (self.method_map)(&retyped)
    }
}

impl fmt::Debug for MemberMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberMapping").finish_non_exhaustive()
    }
}

/// A single edit that took one graph revision to the next.
#[derive(Debug, Clone)]
pub enum FlowGraphUpdate {
    /// A named instruction was inserted.
    AddInstruction {
        /// The new instruction's tag.
        tag: ValueTag,
        /// The instruction.
        instruction: Instruction,
    },
    /// A named instruction's operation or arguments changed; its tag and position did not.
    ReplaceInstruction {
        /// The instruction's tag.
        tag: ValueTag,
        /// The new instruction.
        instruction: Instruction,
    },
    /// A named instruction was removed.
    RemoveInstruction {
        /// The removed instruction's tag.
        tag: ValueTag,
    },
    /// An empty block was added.
    AddBlock {
        /// The new block's tag.
        tag: BasicBlockTag,
    },
    /// A block was removed together with its instructions and parameters.
    RemoveBlock {
        /// The removed block's tag.
        tag: BasicBlockTag,
    },
    /// The entry point changed.
    SetEntryPoint {
        /// The new entry point.
        tag: BasicBlockTag,
    },
    /// A block's parameter list changed.
    SetParameters {
        /// The block whose parameters changed.
        block: BasicBlockTag,
    },
    /// A block's flow changed.
    SetFlow {
        /// The block whose flow changed.
        block: BasicBlockTag,
    },
    /// Every type and method reference in the graph was rewritten.
    RemapMembers {
        /// The mapping that was applied.
        mapping: MemberMapping,
    },
}

impl FlowGraphUpdate {
    /// Returns `true` if this update can change the set of blocks or the edges between them.
    ///
    /// Analyses that only depend on control-flow structure (predecessors, dominators,
    /// reachability) can ignore every update for which this returns `false`.
    #[must_use]
    pub const fn affects_control_flow(&self) -> bool {
        matches!(
            self,
            FlowGraphUpdate::AddBlock { .. }
                | FlowGraphUpdate::RemoveBlock { .. }
                | FlowGraphUpdate::SetFlow { .. }
                | FlowGraphUpdate::SetEntryPoint { .. }
        )
    }

    /// Returns `true` if this update only touches named instructions.
    #[must_use]
    pub const fn is_instruction_update(&self) -> bool {
        matches!(
            self,
            FlowGraphUpdate::AddInstruction { .. }
                | FlowGraphUpdate::ReplaceInstruction { .. }
                | FlowGraphUpdate::RemoveInstruction { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_flow_classification() {
        let block = BasicBlockTag::new("b");
        let value = ValueTag::new("v");
        assert!(FlowGraphUpdate::SetFlow {
            block: block.clone()
        }
        .affects_control_flow());
        assert!(FlowGraphUpdate::AddBlock { tag: block.clone() }.affects_control_flow());
        assert!(!FlowGraphUpdate::SetParameters { block }.affects_control_flow());
        assert!(!FlowGraphUpdate::RemoveInstruction { tag: value.clone() }.affects_control_flow());
        assert!(FlowGraphUpdate::RemoveInstruction { tag: value }.is_instruction_update());
    }

    #[test]
    fn test_member_mapping_rewrites_method_signatures() {
        let mapping = MemberMapping::from_types(|ty| match ty {
            Type::Named(name) if &**name == "T" => Type::int32(),
            other => other.clone(),
        });
        let method = Method::new("f", vec![Type::named("T")], Type::named("T"), true);
        let mapped = mapping.map_method(&method);
        assert_eq!(mapped.return_type, Type::int32());
        assert_eq!(&*mapped.parameter_types, &[Type::int32()]);
    }
}
