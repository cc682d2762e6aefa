//! The shredder: recursively dissects nested records into per-leaf triple
//! streams.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::Result;
use crate::schema::{NodeId, Schema};

/// One shredded value: `(value, repetition_level, definition_level)`.
/// `value` is `Value::Null` when the leaf is absent for this occurrence.
pub type Triple = (Value, i16, i16);

/// Per-leaf triple streams, keyed by leaf [`NodeId`].
pub type ColumnStreams = IndexMap<NodeId, Vec<Triple>>;

/// Shreds `records` against `schema`, appending each record's triples onto
/// the running per-leaf streams. Keys not present in the schema are
/// silently skipped; see the module docs for the exact validation errors
/// raised on type mismatches.
pub fn shred_records(schema: &Schema, records: &[Value]) -> Result<ColumnStreams> {
    let mut out: ColumnStreams = schema.leaves().iter().map(|&id| (id, Vec::new())).collect();
    for record in records {
        dissect(schema, schema.root(), record, 0, 0, &mut out)?;
    }
    Ok(out)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Dissects one mapping (`record`, or `Value::Null` when synthesizing an
/// absent sub-record during cleanup) against `writer`'s children, appending
/// triples to `out`. `r_in` is the repetition level inherited from the
/// caller; `ambient_d` is the definition level at which `record` itself
/// exists.
fn dissect(
    schema: &Schema,
    writer: NodeId,
    record: &Value,
    r_in: i16,
    ambient_d: i16,
    out: &mut ColumnStreams,
) -> Result<()> {
    let mut seen: HashSet<NodeId> = HashSet::new();

    if let Value::Object(map) = record {
        for (key, value) in map {
            let Some(child) = schema.child(writer, key) else {
                continue;
            };

            if schema.is_repeated(child) {
                let Value::Array(items) = value else {
                    return Err(type_mismatch_err!(
                        "Field '{}' is repeated, expected list, found {}: {}",
                        key,
                        json_type_name(value),
                        value
                    ));
                };

                if !items.is_empty() {
                    seen.insert(child);
                }

                for (i, item) in items.iter().enumerate() {
                    let child_r = if i == 0 {
                        r_in
                    } else {
                        schema.max_repetition_level(child)
                    };
                    if schema.is_leaf(child) {
                        out.entry(child).or_default().push((
                            item.clone(),
                            child_r,
                            schema.max_definition_level(child),
                        ));
                    } else {
                        dissect(schema, child, item, child_r, ambient_d + 1, out)?;
                    }
                }
            } else {
                if value.is_array() {
                    return Err(type_mismatch_err!(
                        "Field '{}' is not repeated, expected single value, found list: {}",
                        key,
                        value
                    ));
                }
                if value.is_null() {
                    continue;
                }

                seen.insert(child);
                if schema.is_leaf(child) {
                    out.entry(child)
                        .or_default()
                        .push((value.clone(), r_in, ambient_d + 1));
                } else {
                    if !value.is_object() {
                        return Err(type_mismatch_err!(
                            "Field '{}' is a nested group, expected dict, found {}: {}",
                            key,
                            json_type_name(value),
                            value
                        ));
                    }
                    dissect(schema, child, value, r_in, ambient_d + 1, out)?;
                }
            }
        }
    }

    for child in schema.children(writer) {
        if seen.contains(&child) {
            continue;
        }
        if schema.is_leaf(child) {
            out.entry(child)
                .or_default()
                .push((Value::Null, r_in, ambient_d));
        } else {
            dissect(schema, child, &Value::Null, r_in, ambient_d, out)?;
        }
    }

    Ok(())
}
