//! The assembler: reconstructs nested records from per-leaf triple streams
//! by walking the FSM and replaying the schema's nesting structure.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::fsm::{build_fsm, Fsm, Transition};
use crate::schema::{NodeId, Schema};
use crate::shred::{ColumnStreams, Triple};

/// Reads one leaf's triple stream in order, with one-ahead lookahead.
struct ColumnReader<'a> {
    data: &'a [Triple],
    pos: usize,
}

impl<'a> ColumnReader<'a> {
    fn new(data: &'a [Triple]) -> Self {
        ColumnReader { data, pos: 0 }
    }

    fn has_next(&self) -> bool {
        self.pos < self.data.len()
    }

    fn peek(&self) -> Option<&'a Triple> {
        self.data.get(self.pos)
    }

    fn next(&mut self) -> Result<Triple> {
        let triple = self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::Exhausted("column reader advanced past the end of its stream".to_string()))?
            .clone();
        self.pos += 1;
        Ok(triple)
    }
}

/// A not-yet-attached container under construction. The Rust analogue of
/// the reference assembler's live-aliased `buffer`: instead of mutating a
/// shared reference in place, each scope owns its frame and attaches it
/// into its parent's frame when the scope closes.
enum Frame {
    Object(Map<String, Value>),
    List(Vec<Value>),
}

/// Which nodes open (or close) an element wrapper for a given assembly
/// run. Computed per `selection`, not from the schema alone: a projection
/// that omits a repeated group's declared-first (or -last) child must
/// still open (or close) the wrapper on whichever selected descendant is
/// first (or last) to need it, or scopes desync across the gap.
struct RepetitionBoundaries {
    first: HashSet<NodeId>,
    last: HashSet<NodeId>,
}

impl RepetitionBoundaries {
    /// `active` is every node on the path from the root to any selected
    /// leaf. Among an active repeated parent's active children, the first
    /// and last (in schema declaration order) bound the element wrapper.
    fn for_leaves(schema: &Schema, leaves: &[NodeId]) -> Self {
        let active: HashSet<NodeId> = leaves
            .iter()
            .flat_map(|&leaf| schema.path_from_root(leaf))
            .collect();

        let mut first = HashSet::new();
        let mut last = HashSet::new();
        for &node in &active {
            let Some(parent) = schema.parent(node) else {
                continue;
            };
            if !schema.is_repeated(parent) {
                continue;
            }
            let active_siblings: Vec<NodeId> = schema.children(parent).filter(|c| active.contains(c)).collect();
            if active_siblings.first() == Some(&node) {
                first.insert(node);
            }
            if active_siblings.last() == Some(&node) {
                last.insert(node);
            }
        }
        RepetitionBoundaries { first, last }
    }

    fn is_first(&self, node: NodeId) -> bool {
        self.first.contains(&node)
    }

    fn is_last(&self, node: NodeId) -> bool {
        self.last.contains(&node)
    }
}

/// Drives one record's worth of scope opens/closes over an explicit frame
/// stack. `stack[0]` is the record's own root object and is never popped.
struct RecordAssembler<'a> {
    schema: &'a Schema,
    boundaries: &'a RepetitionBoundaries,
    stack: Vec<Frame>,
    current: NodeId,
}

impl<'a> RecordAssembler<'a> {
    fn new(schema: &'a Schema, boundaries: &'a RepetitionBoundaries) -> Self {
        RecordAssembler {
            schema,
            boundaries,
            stack: vec![Frame::Object(Map::new())],
            current: schema.root(),
        }
    }

    fn attach_named(&mut self, name: &str, value: Value) {
        match self.stack.last_mut().expect("frame stack is never empty") {
            Frame::Object(map) => {
                map.insert(name.to_string(), value);
            }
            Frame::List(_) => unreachable!("a named value can only attach into an object frame"),
        }
    }

    fn attach_unnamed(&mut self, value: Value) {
        match self.stack.last_mut().expect("frame stack is never empty") {
            Frame::List(list) => list.push(value),
            Frame::Object(_) => unreachable!("an unnamed value can only attach into a list frame"),
        }
    }

    /// Opens `node`'s scope: pushes an element-wrapper frame if `node` is
    /// the first child of a repeated parent, then `node`'s own frame unless
    /// it is a non-repeated leaf (which writes directly into the frame
    /// already open below it).
    fn begin(&mut self, node: NodeId) {
        if self.boundaries.is_first(node) {
            self.stack.push(Frame::Object(Map::new()));
        }

        let is_leaf = self.schema.is_leaf(node);
        let is_repeated = self.schema.is_repeated(node);
        if is_repeated {
            self.stack.push(Frame::List(Vec::new()));
        } else if !is_leaf {
            self.stack.push(Frame::Object(Map::new()));
        }
    }

    /// Closes `node`'s scope: pops and attaches `node`'s own frame (if one
    /// was pushed), then, if `node` is the last child of a repeated parent,
    /// pops the element wrapper and either attaches it (non-empty) or
    /// discards it (empty, meaning nothing under it was ever set).
    fn end(&mut self, node: NodeId) {
        let is_leaf = self.schema.is_leaf(node);
        let is_repeated = self.schema.is_repeated(node);
        if is_repeated || !is_leaf {
            let own = self.stack.pop().expect("begin pushed a frame for this node");
            let value = match own {
                Frame::Object(map) => Value::Object(map),
                Frame::List(list) => Value::Array(list),
            };
            self.attach_named(self.schema.name(node), value);
        }

        if self.boundaries.is_last(node) {
            let wrapper = self.stack.pop().expect("is_first pushed a wrapper");
            match wrapper {
                Frame::Object(map) if !map.is_empty() => self.attach_unnamed(Value::Object(map)),
                Frame::Object(_) => {}
                Frame::List(_) => unreachable!("element wrappers are always objects"),
            }
        }
    }

    fn add(&mut self, node: NodeId, value: Value) {
        match self.stack.last_mut().expect("frame stack is never empty") {
            Frame::List(list) => list.push(value),
            Frame::Object(map) => {
                map.insert(self.schema.name(node).to_string(), value);
            }
        }
    }

    fn move_to_level(&mut self, new_level: i16, next_node: NodeId) -> Result<()> {
        let ancestor = self.schema.common_ancestor(self.current, next_node);
        self.return_to_level(self.schema.max_definition_level(ancestor));

        let path = self.schema.path_from_root(next_node);
        while self.schema.max_definition_level(self.current) < new_level {
            let next_index = (self.schema.max_definition_level(self.current) + 1) as usize;
            self.current = *path.get(next_index).ok_or_else(|| {
                Error::Exhausted(format!(
                    "schema path to '{}' is shorter than its own definition level",
                    self.schema.name(next_node)
                ))
            })?;
            self.begin(self.current);
        }
        Ok(())
    }

    fn return_to_level(&mut self, new_level: i16) {
        while self.schema.max_definition_level(self.current) > new_level {
            self.end(self.current);
            self.current = self
                .schema
                .parent(self.current)
                .expect("a node above definition level 0 always has a parent");
        }
    }

    fn is_repeating(&self, from: NodeId, to: NodeId) -> bool {
        self.schema.preorder_rank(from) >= self.schema.preorder_rank(to)
    }

    fn finish(mut self) -> Value {
        match self.stack.pop().expect("root frame is always present") {
            Frame::Object(map) => Value::Object(map),
            Frame::List(_) => unreachable!("the root frame is always an object"),
        }
    }
}

/// Assembles every record encoded in `columns` against `schema`, restricted
/// to `selection` if given (all leaves otherwise). Column streams are
/// consumed in lockstep: each call drains exactly as many triples as there
/// are records.
pub fn assemble_records(
    schema: &Schema,
    columns: &ColumnStreams,
    selection: Option<&[NodeId]>,
) -> Result<Vec<Value>> {
    let fsm = build_fsm(schema, selection)?;

    let leaves: Vec<NodeId> = match selection {
        None => schema.leaves().to_vec(),
        Some(selected) => {
            let selected_set: HashSet<NodeId> = selected.iter().copied().collect();
            schema
                .leaves()
                .iter()
                .copied()
                .filter(|leaf| selected_set.contains(leaf))
                .collect()
        }
    };

    let Some(&first_leaf) = leaves.first() else {
        return Err(Error::Selection(
            "column selection must include at least one leaf".to_string(),
        ));
    };

    let empty: Vec<Triple> = Vec::new();
    let mut readers: IndexMap<NodeId, ColumnReader> = leaves
        .iter()
        .map(|&leaf| (leaf, ColumnReader::new(columns.get(&leaf).map(Vec::as_slice).unwrap_or(&empty))))
        .collect();

    let boundaries = RepetitionBoundaries::for_leaves(schema, &leaves);

    let mut records = Vec::new();
    while readers[&first_leaf].has_next() {
        records.push(assemble_one(schema, &boundaries, &fsm, first_leaf, &mut readers)?);
    }
    Ok(records)
}

fn assemble_one(
    schema: &Schema,
    boundaries: &RepetitionBoundaries,
    fsm: &Fsm,
    first_leaf: NodeId,
    readers: &mut IndexMap<NodeId, ColumnReader>,
) -> Result<Value> {
    let mut assembler = RecordAssembler::new(schema, boundaries);
    let mut descriptor = first_leaf;

    loop {
        assembler.move_to_level(schema.max_definition_level(descriptor), descriptor)?;

        let reader = readers
            .get_mut(&descriptor)
            .expect("the fsm only transitions between selected leaves");
        let (value, _r, d) = reader.next()?;

        if d == schema.max_definition_level(descriptor) {
            assembler.add(descriptor, value);
        }

        let next_repetition_level = reader.peek().map(|(_, r, _)| *r).unwrap_or(0);

        let transition = *fsm[&descriptor].get(&next_repetition_level).ok_or_else(|| {
            Error::Exhausted(format!(
                "no fsm transition for '{}' at repetition level {}",
                schema.name(descriptor),
                next_repetition_level
            ))
        })?;

        let next_descriptor = match transition {
            Transition::End => None,
            Transition::Leaf(next) => Some(next),
        };

        if let Some(next) = next_descriptor {
            if assembler.is_repeating(descriptor, next) {
                let level = schema.full_definition_for_repetition_level(descriptor, next_repetition_level)?;
                assembler.return_to_level(level);
            }
        }

        match next_descriptor {
            None => break,
            Some(next) => descriptor = next,
        }
    }

    assembler.return_to_level(0);
    Ok(assembler.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_schema;
    use crate::shred::shred_records;
    use serde_json::json;

    fn paper_schema() -> Schema {
        parse_schema(&[
            "DocId",
            "Links.Backward[*]",
            "Links.Forward[*]",
            "Name[*].Language[*].Code",
            "Name[*].Language[*].Country",
            "Name[*].Url",
        ])
        .unwrap()
    }

    #[test]
    fn repeated_group_fields_append_not_overwrite() {
        let schema = parse_schema(&["doc.title", "doc.links[*].url"]).unwrap();
        let records = vec![
            json!({
                "doc": {
                    "title": "Dremel Paper",
                    "links": [{"url": "http://google.com"}, {"url": "http://cs.stanford.edu"}]
                }
            }),
            json!({"doc": {"title": "Another Doc"}}),
        ];

        let columns = shred_records(&schema, &records).unwrap();
        let assembled = assemble_records(&schema, &columns, None).unwrap();

        assert_eq!(
            assembled,
            vec![
                json!({
                    "doc": {
                        "title": "Dremel Paper",
                        "links": [{"url": "http://google.com"}, {"url": "http://cs.stanford.edu"}]
                    }
                }),
                json!({"doc": {"title": "Another Doc", "links": []}}),
            ]
        );
    }

    #[test]
    fn empty_column_streams_assemble_to_no_records() {
        let schema = paper_schema();
        let columns = shred_records(&schema, &[]).unwrap();
        let assembled = assemble_records(&schema, &columns, None).unwrap();
        assert!(assembled.is_empty());
    }

    #[test]
    fn column_selection_assembles_a_projection() {
        let schema = paper_schema();
        let records = vec![json!({
            "DocId": 10,
            "Links": {"Forward": [20, 40]},
            "Name": [{"Url": "http://A"}]
        })];
        let columns = shred_records(&schema, &records).unwrap();

        let doc_id = schema.get_descriptor("DocId").unwrap();
        let url = schema.get_descriptor("Name.Url").unwrap();

        let assembled = assemble_records(&schema, &columns, Some(&[doc_id, url])).unwrap();
        assert_eq!(assembled, vec![json!({"DocId": 10, "Name": [{"Url": "http://A"}]})]);
    }

    /// `Url` is not `Name`'s declared-first child (`Language` is), so a
    /// selection that skips `Language` entirely must still open and close
    /// `Name`'s element wrapper once per repetition of `Url` itself,
    /// keeping each element its own object rather than merging into one.
    #[test]
    fn column_selection_skipping_a_groups_first_child_keeps_elements_distinct() {
        let schema = paper_schema();
        let records = vec![json!({
            "DocId": 10,
            "Name": [{"Url": "http://A"}, {"Url": "http://B"}]
        })];
        let columns = shred_records(&schema, &records).unwrap();

        let doc_id = schema.get_descriptor("DocId").unwrap();
        let url = schema.get_descriptor("Name.Url").unwrap();

        let assembled = assemble_records(&schema, &columns, Some(&[doc_id, url])).unwrap();
        assert_eq!(
            assembled,
            vec![json!({
                "DocId": 10,
                "Name": [{"Url": "http://A"}, {"Url": "http://B"}]
            })]
        );
    }

    #[test]
    fn selecting_no_leaves_is_an_error() {
        let schema = paper_schema();
        let columns = shred_records(&schema, &[]).unwrap();
        let result = assemble_records(&schema, &columns, Some(&[]));
        assert!(matches!(result, Err(Error::Selection(_))));
    }

    #[test]
    fn truncated_column_stream_is_exhausted_error() {
        let schema = parse_schema(&["a", "b"]).unwrap();
        let mut columns: ColumnStreams = IndexMap::new();
        let a = schema.get_descriptor("a").unwrap();
        let b = schema.get_descriptor("b").unwrap();
        columns.insert(a, vec![(json!(1), 0, 1)]);
        columns.insert(b, vec![]);

        let result = assemble_records(&schema, &columns, None);
        assert!(matches!(result, Err(Error::Exhausted(_))));
    }
}
