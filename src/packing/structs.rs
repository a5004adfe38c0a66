use std::collections::HashMap;
use std::io::{Read, Write};

use crate::packing::error::{PackError, UnpackError};
use crate::packing::ll::{MarkerByte, Signature, TinySizeMarker};
use crate::packing::{Packable, Value};

fn write_struct_header<T: Write>(
    buf: &mut T,
    field_count: u8,
    signature: Signature,
) -> Result<usize, PackError> {
    buf.write_all(&[
        TinySizeMarker::new(MarkerByte::TinyStruct, field_count).as_byte(),
        signature as u8,
    ])?;
    Ok(2)
}

fn take_field(
    fields: &mut std::vec::IntoIter<Value>,
    structure: &'static str,
) -> Result<Value, UnpackError> {
    fields
        .next()
        .ok_or(UnpackError::WrongFieldCount {
            structure,
            expected: 0,
            actual: 0,
        })
}

fn expect_integer(v: Value, structure: &'static str) -> Result<i64, UnpackError> {
    match v {
        Value::Integer(i) => Ok(i),
        _ => Err(UnpackError::UnexpectedValueType {
            structure,
            expected: "Integer",
        }),
    }
}

fn expect_string(v: Value, structure: &'static str) -> Result<String, UnpackError> {
    match v {
        Value::String(s) => Ok(s),
        _ => Err(UnpackError::UnexpectedValueType {
            structure,
            expected: "String",
        }),
    }
}

fn expect_map(v: Value, structure: &'static str) -> Result<HashMap<String, Value>, UnpackError> {
    match v {
        Value::Map(m) => Ok(m),
        _ => Err(UnpackError::UnexpectedValueType {
            structure,
            expected: "Map",
        }),
    }
}

fn expect_string_list(v: Value, structure: &'static str) -> Result<Vec<String>, UnpackError> {
    match v {
        Value::List(items) => items
            .into_iter()
            .map(|i| expect_string(i, structure))
            .collect(),
        _ => Err(UnpackError::UnexpectedValueType {
            structure,
            expected: "List<String>",
        }),
    }
}

fn expect_node_list(v: Value, structure: &'static str) -> Result<Vec<Node>, UnpackError> {
    match v {
        Value::List(items) => items
            .into_iter()
            .map(|i| match i {
                Value::Node(n) => Ok(n),
                _ => Err(UnpackError::UnexpectedValueType {
                    structure,
                    expected: "Node",
                }),
            })
            .collect(),
        _ => Err(UnpackError::UnexpectedValueType {
            structure,
            expected: "List<Node>",
        }),
    }
}

fn expect_unbound_rel_list(
    v: Value,
    structure: &'static str,
) -> Result<Vec<UnboundRelationship>, UnpackError> {
    match v {
        Value::List(items) => items
            .into_iter()
            .map(|i| match i {
                Value::UnboundRelationship(r) => Ok(r),
                _ => Err(UnpackError::UnexpectedValueType {
                    structure,
                    expected: "UnboundRelationship",
                }),
            })
            .collect(),
        _ => Err(UnpackError::UnexpectedValueType {
            structure,
            expected: "List<UnboundRelationship>",
        }),
    }
}

fn expect_integer_list(v: Value, structure: &'static str) -> Result<Vec<i64>, UnpackError> {
    match v {
        Value::List(items) => items
            .into_iter()
            .map(|i| expect_integer(i, structure))
            .collect(),
        _ => Err(UnpackError::UnexpectedValueType {
            structure,
            expected: "List<Integer>",
        }),
    }
}

fn require_field_count(
    fields: &[Value],
    expected: usize,
    structure: &'static str,
) -> Result<(), UnpackError> {
    if fields.len() != expected {
        Err(UnpackError::WrongFieldCount {
            structure,
            expected,
            actual: fields.len(),
        })
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: HashMap<String, Value>,
}

impl Node {
    pub fn from_fields(fields: Vec<Value>) -> Result<Node, UnpackError> {
        require_field_count(&fields, 3, "Node")?;
        let mut it = fields.into_iter();
        let id = expect_integer(take_field(&mut it, "Node")?, "Node")?;
        let labels = expect_string_list(take_field(&mut it, "Node")?, "Node")?;
        let properties = expect_map(take_field(&mut it, "Node")?, "Node")?;
        Ok(Node {
            id,
            labels,
            properties,
        })
    }
}

impl Packable for Node {
    fn pack_to<T: Write>(&self, buf: &mut T) -> Result<usize, PackError> {
        let mut written = write_struct_header(buf, 3, Signature::Node)?;
        written += Value::Integer(self.id).pack_to(buf)?;
        written +=
            Value::List(self.labels.iter().cloned().map(Value::String).collect()).pack_to(buf)?;
        written += Value::Map(self.properties.clone()).pack_to(buf)?;
        Ok(written)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnboundRelationship {
    pub id: i64,
    pub rel_type: String,
    pub properties: HashMap<String, Value>,
}

impl UnboundRelationship {
    pub fn from_fields(fields: Vec<Value>) -> Result<UnboundRelationship, UnpackError> {
        require_field_count(&fields, 3, "UnboundRelationship")?;
        let mut it = fields.into_iter();
        let id = expect_integer(take_field(&mut it, "UnboundRelationship")?, "UnboundRelationship")?;
        let rel_type = expect_string(
            take_field(&mut it, "UnboundRelationship")?,
            "UnboundRelationship",
        )?;
        let properties = expect_map(
            take_field(&mut it, "UnboundRelationship")?,
            "UnboundRelationship",
        )?;
        Ok(UnboundRelationship {
            id,
            rel_type,
            properties,
        })
    }

    /// Binds this unbound relationship to a direction between two nodes,
    /// producing a fully-addressed `Relationship`.
    pub fn bind(&self, start_id: i64, end_id: i64) -> Relationship {
        Relationship {
            id: self.id,
            start_id,
            end_id,
            rel_type: self.rel_type.clone(),
            properties: self.properties.clone(),
        }
    }
}

impl Packable for UnboundRelationship {
    fn pack_to<T: Write>(&self, buf: &mut T) -> Result<usize, PackError> {
        let mut written = write_struct_header(buf, 3, Signature::UnboundRelationship)?;
        written += Value::Integer(self.id).pack_to(buf)?;
        written += Value::String(self.rel_type.clone()).pack_to(buf)?;
        written += Value::Map(self.properties.clone()).pack_to(buf)?;
        Ok(written)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: i64,
    pub start_id: i64,
    pub end_id: i64,
    pub rel_type: String,
    pub properties: HashMap<String, Value>,
}

impl Relationship {
    pub fn from_fields(fields: Vec<Value>) -> Result<Relationship, UnpackError> {
        require_field_count(&fields, 5, "Relationship")?;
        let mut it = fields.into_iter();
        let id = expect_integer(take_field(&mut it, "Relationship")?, "Relationship")?;
        let start_id = expect_integer(take_field(&mut it, "Relationship")?, "Relationship")?;
        let end_id = expect_integer(take_field(&mut it, "Relationship")?, "Relationship")?;
        let rel_type = expect_string(take_field(&mut it, "Relationship")?, "Relationship")?;
        let properties = expect_map(take_field(&mut it, "Relationship")?, "Relationship")?;
        Ok(Relationship {
            id,
            start_id,
            end_id,
            rel_type,
            properties,
        })
    }
}

impl Packable for Relationship {
    fn pack_to<T: Write>(&self, buf: &mut T) -> Result<usize, PackError> {
        let mut written = write_struct_header(buf, 5, Signature::Relationship)?;
        written += Value::Integer(self.id).pack_to(buf)?;
        written += Value::Integer(self.start_id).pack_to(buf)?;
        written += Value::Integer(self.end_id).pack_to(buf)?;
        written += Value::String(self.rel_type.clone()).pack_to(buf)?;
        written += Value::Map(self.properties.clone()).pack_to(buf)?;
        Ok(written)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// One hop of a hydrated path: the node traversal started from, the fully
/// bound relationship that was traversed, and the node arrived at.
pub struct PathSegment {
    pub start: Node,
    pub relationship: Relationship,
    pub end: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub start: Node,
    pub end: Node,
    pub segments: Vec<PathSegment>,
}

impl Path {
    pub fn from_fields(fields: Vec<Value>) -> Result<Path, UnpackError> {
        require_field_count(&fields, 3, "Path")?;
        let mut it = fields.into_iter();
        let nodes = expect_node_list(take_field(&mut it, "Path")?, "Path")?;
        let rels = expect_unbound_rel_list(take_field(&mut it, "Path")?, "Path")?;
        let sequence = expect_integer_list(take_field(&mut it, "Path")?, "Path")?;
        bind_path(nodes, rels, sequence)
    }
}

impl Packable for Path {
    fn pack_to<T: Write>(&self, buf: &mut T) -> Result<usize, PackError> {
        // Paths are hydrated on unpack; the wire form is only needed when a
        // server round-trips a path value back as a query parameter, which
        // Bolt v1 does not do. Packing re-derives the raw (nodes, rels,
        // sequence) triple from the bound segments.
        let mut nodes = Vec::new();
        let mut rels = Vec::new();
        let mut sequence = Vec::new();
        let mut node_index = HashMap::new();
        node_index.insert(self.start.id, push_node(&mut nodes, &self.start));

        let mut prev_id = self.start.id;
        for segment in &self.segments {
            let rel_index = push_rel(&mut rels, &segment.relationship);
            let signed_index = if segment.relationship.start_id == prev_id {
                rel_index as i64
            } else {
                -(rel_index as i64)
            };
            let next_node = &segment.end;
            let next_node_index = *node_index
                .entry(next_node.id)
                .or_insert_with(|| push_node(&mut nodes, next_node));
            sequence.push(signed_index);
            sequence.push(next_node_index as i64);
            prev_id = next_node.id;
        }

        let mut written = write_struct_header(buf, 3, Signature::Path)?;
        written += Value::List(nodes.into_iter().map(Value::Node).collect()).pack_to(buf)?;
        written +=
            Value::List(rels.into_iter().map(Value::UnboundRelationship).collect()).pack_to(buf)?;
        written += Value::List(sequence.into_iter().map(Value::Integer).collect()).pack_to(buf)?;
        Ok(written)
    }
}

fn push_node(nodes: &mut Vec<Node>, node: &Node) -> i64 {
    nodes.push(node.clone());
    (nodes.len() - 1) as i64
}

fn push_rel(rels: &mut Vec<UnboundRelationship>, rel: &Relationship) -> i64 {
    rels.push(UnboundRelationship {
        id: rel.id,
        rel_type: rel.rel_type.clone(),
        properties: rel.properties.clone(),
    });
    rels.len() as i64 // 1-based
}

/// Binds the raw `(nodes, rels, sequence)` wire form of a Path into fully
/// addressed segments. `sequence` is a flat list of `(relIndex, nextNodeIndex)`
/// pairs; `relIndex` is 1-based with the sign encoding traversal direction
/// (positive: prev -> next, negative: next -> prev), `nextNodeIndex` is
/// 0-based into `nodes`.
fn bind_path(
    nodes: Vec<Node>,
    rels: Vec<UnboundRelationship>,
    sequence: Vec<i64>,
) -> Result<Path, UnpackError> {
    if nodes.is_empty() {
        return Err(UnpackError::NodeIndexOutOfRange {
            index: 0,
            node_count: 0,
        });
    }
    if sequence.len() % 2 != 0 {
        return Err(UnpackError::WrongFieldCount {
            structure: "Path.sequence",
            expected: sequence.len() + 1,
            actual: sequence.len(),
        });
    }

    let start = nodes[0].clone();
    let mut prev = start.clone();
    let mut segments = Vec::with_capacity(sequence.len() / 2);

    for pair in sequence.chunks(2) {
        let rel_index = pair[0];
        let next_node_index = pair[1];

        if rel_index == 0 || rel_index.unsigned_abs() as usize > rels.len() {
            return Err(UnpackError::UnboundRelationshipInPath {
                index: rel_index,
                path_len: rels.len(),
            });
        }
        if next_node_index < 0 || next_node_index as usize >= nodes.len() {
            return Err(UnpackError::NodeIndexOutOfRange {
                index: next_node_index.max(0) as usize,
                node_count: nodes.len(),
            });
        }

        let unbound = &rels[(rel_index.unsigned_abs() as usize) - 1];
        let next = nodes[next_node_index as usize].clone();

        let relationship = if rel_index > 0 {
            unbound.bind(prev.id, next.id)
        } else {
            unbound.bind(next.id, prev.id)
        };

        segments.push(PathSegment {
            start: prev.clone(),
            relationship,
            end: next.clone(),
        });

        prev = next;
    }

    Ok(Path {
        start,
        end: prev,
        segments,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn node(id: i64) -> Node {
        Node {
            id,
            labels: Vec::new(),
            properties: HashMap::new(),
        }
    }

    fn unbound(id: i64) -> UnboundRelationship {
        UnboundRelationship {
            id,
            rel_type: "KNOWS".to_string(),
            properties: HashMap::new(),
        }
    }

    #[test]
    fn node_round_trip() {
        let mut props = HashMap::new();
        props.insert("name".to_string(), Value::String("Alice".to_string()));
        let n = Node {
            id: 42,
            labels: vec!["Person".to_string()],
            properties: props,
        };
        let mut bytes = Vec::new();
        n.pack_to(&mut bytes).unwrap();
        assert_eq!(
            Value::unpack_from(&mut bytes.as_slice()).unwrap(),
            Value::Node(n)
        );
    }

    #[test]
    fn path_binding_matches_scenario() {
        // nodes=[N0,N1,N2], rels=[UR1,UR2], sequence=[1,1,-2,2]
        let nodes = vec![node(0), node(1), node(2)];
        let rels = vec![unbound(1), unbound(2)];
        let sequence = vec![1, 1, -2, 2];

        let path = bind_path(nodes, rels, sequence).unwrap();

        assert_eq!(path.start.id, 0);
        assert_eq!(path.end.id, 2);
        assert_eq!(path.segments.len(), 2);

        assert_eq!(path.segments[0].start.id, 0);
        assert_eq!(path.segments[0].end.id, 1);
        assert_eq!(path.segments[0].relationship.start_id, 0);
        assert_eq!(path.segments[0].relationship.end_id, 1);

        assert_eq!(path.segments[1].start.id, 1);
        assert_eq!(path.segments[1].end.id, 2);
        // negative index: next -> prev, i.e. N2 -> N1
        assert_eq!(path.segments[1].relationship.start_id, 2);
        assert_eq!(path.segments[1].relationship.end_id, 1);
    }

    #[test]
    fn zero_rel_index_is_rejected() {
        let nodes = vec![node(0), node(1)];
        let rels = vec![unbound(1)];
        let sequence = vec![0, 1];
        assert!(bind_path(nodes, rels, sequence).is_err());
    }
}
