//! Built-in graph passes.
//!
//! | Pass | Effect |
//! |------|--------|
//! | [`AllocaToRegisterPass`] | promotes load/store-only stack slots to SSA values |
//! | [`ConstantPropagationPass`] | sparse conditional constant propagation |
//! | [`CopyPropagationPass`] | forwards copies and trivial block parameters |
//! | [`DeadValueEliminationPass`] | deletes unused values without effects |
//! | [`DeadBlockEliminationPass`] | deletes blocks the entry cannot reach |

mod alloca_to_register;
mod constant_propagation;
mod copy_propagation;
mod dead_blocks;
mod dead_values;

pub use alloca_to_register::AllocaToRegisterPass;
pub use constant_propagation::{ConstantCell, ConstantLattice, ConstantPropagationPass};
pub use copy_propagation::CopyPropagationPass;
pub use dead_blocks::DeadBlockEliminationPass;
pub use dead_values::DeadValueEliminationPass;
