//! Identity tags for values and basic blocks.
//!
//! Every definition in a [`crate::ir::FlowGraph`] (a named instruction or a block
//! parameter) is identified by a [`ValueTag`], and every basic block by a
//! [`BasicBlockTag`]. Tags are minted from a process-wide monotonic counter, so a tag
//! can never alias a different definition anywhere in a graph lineage, even after the
//! definition it named has been removed. The human-readable name is interned alongside
//! the id and is used for display only: two tags with the same name are still distinct.
//!
//! Tags are cheap to clone (a `u64` plus an `Arc<str>` bump) and compare, hash and
//! order by id only, so iteration over tag-keyed ordered maps follows creation order.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering as AtomicOrdering},
        Arc,
    },
};

static NEXT_TAG_ID: AtomicU64 = AtomicU64::new(1);

fn next_tag_id() -> u64 {
    NEXT_TAG_ID.fetch_add(1, AtomicOrdering::Relaxed)
}

macro_rules! define_tag {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            id: u64,
            name: Arc<str>,
        }

        impl $name {
            /// Mints a fresh, unique tag with the given display name.
            #[must_use]
            pub fn new(name: impl Into<Arc<str>>) -> Self {
                Self {
                    id: next_tag_id(),
                    name: name.into(),
                }
            }

            /// Mints a fresh tag that shares this tag's display name.
            #[must_use]
            pub fn fork(&self) -> Self {
                Self {
                    id: next_tag_id(),
                    name: Arc::clone(&self.name),
                }
            }

            /// Returns the unique numeric id of this tag.
            #[must_use]
            pub const fn id(&self) -> u64 {
                self.id
            }

            /// Returns the display name of this tag.
            #[must_use]
            pub fn name(&self) -> &str {
                &self.name
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.id.cmp(&other.id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.name)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", self.name, self.id)
            }
        }
    };
}

define_tag!(
    /// Identifies a value: the result of a named instruction or a block parameter.
    ValueTag
);

define_tag!(
    /// Identifies a basic block.
    BasicBlockTag
);
