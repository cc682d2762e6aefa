use super::tree::{NodeId, Schema};
use crate::error::Result;

/// Parses an ordered list of dotted paths into a [`Schema`]. A segment
/// ending in the marker `[*]` declares that segment's field as repeated
/// (the marker is stripped from the stored name). Paths that share a
/// prefix reuse the existing node for that prefix; reusing a prefix with a
/// different `[*]` declaration than its first occurrence is a schema
/// error.
///
/// ```
/// use dremel_core::schema::parse_schema;
///
/// let schema = parse_schema(&["DocId", "Links.Backward[*]", "Links.Forward[*]"]).unwrap();
/// assert!(schema.get_descriptor("Links.Backward").is_some());
/// ```
pub fn parse_schema(paths: &[&str]) -> Result<Schema> {
    let mut schema = Schema::new();
    let root = schema.root();

    for path in paths {
        let mut current: NodeId = root;
        for segment in path.split('.') {
            let (name, is_repeated) = match segment.strip_suffix("[*]") {
                Some(stripped) => (stripped, true),
                None => (segment, false),
            };
            current = schema.add_child(current, name, is_repeated)?;
        }
    }

    schema.finalize();
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_schema() {
        let schema = parse_schema(&["a", "b"]).unwrap();
        let a = schema.get_descriptor("a").unwrap();
        let b = schema.get_descriptor("b").unwrap();
        assert_eq!(schema.max_repetition_level(a), 0);
        assert_eq!(schema.max_definition_level(a), 1);
        assert_eq!(schema.max_repetition_level(b), 0);
        assert_eq!(schema.max_definition_level(b), 1);
    }

    #[test]
    fn nested_schema() {
        let schema = parse_schema(&["a.b"]).unwrap();
        let b = schema.get_descriptor("a.b").unwrap();
        assert_eq!(schema.max_definition_level(b), 2);
    }

    #[test]
    fn repeated_group_schema() {
        let schema = parse_schema(&["a[*].b"]).unwrap();
        let a = schema.get_descriptor("a").unwrap();
        let b = schema.get_descriptor("a[*].b").unwrap();
        assert!(schema.is_repeated(a));
        assert_eq!(schema.max_repetition_level(b), 1);
        assert_eq!(schema.max_definition_level(b), 2);
    }

    #[test]
    fn repeated_leaf_schema() {
        let schema = parse_schema(&["a.b[*]"]).unwrap();
        let b = schema.get_descriptor("a.b[*]").unwrap();
        assert!(schema.is_repeated(b));
        assert!(schema.is_leaf(b));
        assert_eq!(schema.max_repetition_level(b), 1);
        assert_eq!(schema.max_definition_level(b), 2);
    }

    #[test]
    fn shared_prefix_reuses_node() {
        let schema = parse_schema(&["Links.Backward[*]", "Links.Forward[*]"]).unwrap();
        let links_via_backward = schema.get_descriptor("Links").unwrap();
        let links_via_forward = schema
            .parent(schema.get_descriptor("Links.Forward").unwrap())
            .unwrap();
        assert_eq!(links_via_backward, links_via_forward);
    }

    #[test]
    fn conflicting_repetition_is_a_schema_error() {
        let result = parse_schema(&["a.b[*]", "a.b"]);
        assert!(matches!(result, Err(crate::error::Error::Schema(_))));
    }

    #[test]
    fn paper_schema_matches_expected_shape() {
        let schema = parse_schema(&[
            "DocId",
            "Links.Backward[*]",
            "Links.Forward[*]",
            "Name[*].Language[*].Code",
            "Name[*].Language[*].Country",
            "Name[*].Url",
        ])
        .unwrap();

        let code = schema.get_descriptor("Name.Language.Code").unwrap();
        let country = schema.get_descriptor("Name.Language.Country").unwrap();
        let url = schema.get_descriptor("Name.Url").unwrap();

        assert_eq!(schema.max_repetition_level(code), 2);
        assert_eq!(schema.max_definition_level(code), 3);
        assert_eq!(schema.max_repetition_level(country), 2);
        assert_eq!(schema.max_definition_level(country), 3);
        assert_eq!(schema.max_repetition_level(url), 1);
        assert_eq!(schema.max_definition_level(url), 2);

        // Declaration order is preserved as child-iteration order.
        let root = schema.root();
        let root_children: Vec<&str> = schema.children(root).map(|c| schema.name(c)).collect();
        assert_eq!(root_children, vec!["DocId", "Links", "Name"]);
    }
}
