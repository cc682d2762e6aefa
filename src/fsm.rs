//! The FSM builder: from a schema (and an optional leaf selection),
//! produces a transition table `(leaf, repetition_level) -> next leaf |
//! END`, consumed by the assembler to interleave reads across column
//! streams.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::schema::{NodeId, Schema};

/// Where the assembler goes after finishing a read from a given leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Leaf(NodeId),
    /// The sentinel marking a completed record.
    End,
}

/// `fsm[leaf][r]` gives the next leaf (or [`Transition::End`]) to read from
/// once the next triple read from `leaf` is known to carry repetition level
/// `r`. Total over `0..=max_repetition_level(leaf)` for every selected
/// leaf.
pub type Fsm = IndexMap<NodeId, IndexMap<i16, Transition>>;

/// Builds the FSM for `schema`, restricted to `selection` if given (all
/// leaves otherwise). `selection`, if present, is reordered to schema
/// declaration order; a leaf not present in `schema` is a
/// [`Error::Selection`].
pub fn build_fsm(schema: &Schema, selection: Option<&[NodeId]>) -> Result<Fsm> {
    let fields: Vec<NodeId> = match selection {
        None => schema.leaves().to_vec(),
        Some(selected) => {
            let selected_set: std::collections::HashSet<NodeId> = selected.iter().copied().collect();
            for &leaf in selected {
                if !schema.leaves().contains(&leaf) {
                    return Err(Error::Selection(format!(
                        "'{}' is not a leaf of this schema",
                        schema.name(leaf)
                    )));
                }
            }
            schema
                .leaves()
                .iter()
                .copied()
                .filter(|l| selected_set.contains(l))
                .collect()
        }
    };

    let mut fsm: Fsm = IndexMap::new();
    for field in &fields {
        fsm.insert(*field, IndexMap::new());
    }

    for (index, &field) in fields.iter().enumerate() {
        let max_level = schema.max_repetition_level(field);
        let barrier = fields.get(index + 1).copied();
        let barrier_level = match barrier {
            Some(b) => schema.max_repetition_level(schema.common_ancestor(field, b)),
            None => 0,
        };

        // Step 1: back edges. Scan earlier fields from nearest to
        // farthest, overwriting at each level so the farthest (last
        // processed) candidate wins.
        for &earlier in fields[..index].iter().rev() {
            if schema.max_repetition_level(earlier) <= barrier_level {
                continue;
            }
            let back_level = schema.max_repetition_level(schema.common_ancestor(earlier, field));
            fsm.get_mut(&field)
                .unwrap()
                .insert(back_level, Transition::Leaf(earlier));
        }

        // Step 2: gap fill. Levels above the barrier with no back edge
        // inherit the entry one level up; the top level self-loops.
        for level in (barrier_level + 1..=max_level).rev() {
            if !fsm[&field].contains_key(&level) {
                let value = if level == max_level {
                    Transition::Leaf(field)
                } else {
                    fsm[&field][&(level + 1)]
                };
                fsm.get_mut(&field).unwrap().insert(level, value);
            }
        }

        // Step 3: barrier edges for everything at or below the barrier.
        let barrier_transition = match barrier {
            Some(b) => Transition::Leaf(b),
            None => Transition::End,
        };
        for level in 0..=barrier_level {
            fsm.get_mut(&field).unwrap().insert(level, barrier_transition);
        }
    }

    Ok(fsm)
}
