//! In-process graph store
//!
//! Adjacency-list graph with a `(label, name)` node index and a `(type, from, to)` edge
//! index. Queries walk the path pattern depth-first from every candidate start node.

use super::{
    missing_names, validate_entities, validate_relationships, EntityMergeReport, GraphStore,
    RelationshipMergeReport, RelationshipOutcome,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use strata_common::errors::Result;
use strata_common::models::{
    AliasTarget, GraphEntitySpec, GraphQuery, GraphRelationshipSpec, GraphRow, Properties,
};
use tokio::sync::RwLock;
use tracing::debug;

struct Node {
    label: String,
    name: String,
    properties: Properties,
}

struct Edge {
    rel_type: String,
    to: usize,
    properties: Properties,
}

#[derive(Default)]
struct GraphState {
    nodes: Vec<Node>,
    node_index: HashMap<(String, String), usize>,
    by_name: HashMap<String, Vec<usize>>,
    edges: Vec<Edge>,
    edge_index: HashSet<(String, usize, usize)>,
    outgoing: HashMap<usize, Vec<usize>>,
}

/// Graph store held in memory; contents are lost on restart
#[derive(Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes and edges
    pub async fn size(&self) -> (usize, usize) {
        let state = self.state.read().await;
        (state.nodes.len(), state.edges.len())
    }
}

/// One partially or fully bound path
struct Path {
    nodes: Vec<usize>,
    edges: Vec<usize>,
}

impl GraphState {
    fn node_value(&self, node: usize, property: &str) -> Value {
        let node = &self.nodes[node];
        if property == "name" {
            return Value::String(node.name.clone());
        }
        node.properties.get(property).cloned().unwrap_or(Value::Null)
    }

    fn edge_value(&self, edge: usize, property: &str) -> Value {
        self.edges[edge]
            .properties
            .get(property)
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn lookup(&self, query: &GraphQuery, path: &Path, alias: &str, property: &str) -> Value {
        match query.resolve(alias) {
            Some(AliasTarget::Node(i)) => self.node_value(path.nodes[i], property),
            Some(AliasTarget::Relationship(i)) => self.edge_value(path.edges[i], property),
            None => Value::Null,
        }
    }

    fn label_matches(&self, node: usize, label: Option<&str>) -> bool {
        label.map_or(true, |l| self.nodes[node].label == l)
    }

    fn walk(&self, query: &GraphQuery, path: &mut Path, rows: &mut Vec<GraphRow>) {
        let depth = path.edges.len();
        if depth == query.hops.len() {
            if self.filters_pass(query, path) {
                rows.push(self.project(query, path));
            }
            return;
        }

        let hop = &query.hops[depth];
        let current = path.nodes[depth];
        let Some(outgoing) = self.outgoing.get(&current) else {
            return;
        };
        for &edge_id in outgoing {
            let edge = &self.edges[edge_id];
            if edge.rel_type != hop.relationship.rel_type
                || path.edges.contains(&edge_id)
                || !self.label_matches(edge.to, hop.node.label.as_deref())
            {
                continue;
            }
            path.edges.push(edge_id);
            path.nodes.push(edge.to);
            self.walk(query, path, rows);
            path.nodes.pop();
            path.edges.pop();
        }
    }

    fn filters_pass(&self, query: &GraphQuery, path: &Path) -> bool {
        query.filters.iter().all(|filter| {
            let actual = self.lookup(query, path, &filter.alias, &filter.property);
            // null never compares equal, as in Cypher
            !actual.is_null() && query.params.get(&filter.param) == Some(&actual)
        })
    }

    fn project(&self, query: &GraphQuery, path: &Path) -> GraphRow {
        query
            .returns
            .iter()
            .map(|item| {
                (
                    item.column.clone(),
                    self.lookup(query, path, &item.alias, &item.property),
                )
            })
            .collect()
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::String(_) => 0,
        Value::Number(_) => 1,
        Value::Bool(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Null => 5,
    }
}

/// Ascending order over projected values; nulls sort last
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(f64::NAN)
            .total_cmp(&y.as_f64().unwrap_or(f64::NAN)),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[async_trait::async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn provision(&self) -> Result<()> {
        Ok(())
    }

    async fn merge_entities(&self, entities: &[GraphEntitySpec]) -> Result<EntityMergeReport> {
        validate_entities(entities)?;

        let mut state = self.state.write().await;
        let mut report = EntityMergeReport::default();
        for spec in entities {
            let key = (spec.label.clone(), spec.name.clone());
            if state.node_index.contains_key(&key) {
                report.existing += 1;
                continue;
            }
            let id = state.nodes.len();
            state.nodes.push(Node {
                label: spec.label.clone(),
                name: spec.name.clone(),
                properties: spec.properties.clone(),
            });
            state.node_index.insert(key, id);
            state.by_name.entry(spec.name.clone()).or_default().push(id);
            report.created += 1;
        }

        debug!(created = report.created, existing = report.existing, "Entities merged");
        Ok(report)
    }

    async fn merge_relationships(
        &self,
        relationships: &[GraphRelationshipSpec],
    ) -> Result<RelationshipMergeReport> {
        validate_relationships(relationships)?;

        let mut state = self.state.write().await;
        let mut report = RelationshipMergeReport::default();
        for spec in relationships {
            let froms = state.by_name.get(&spec.from_name).cloned().unwrap_or_default();
            let tos = state.by_name.get(&spec.to_name).cloned().unwrap_or_default();
            if froms.is_empty() || tos.is_empty() {
                report.outcomes.push(RelationshipOutcome::MissingEndpoint {
                    missing: missing_names(spec, !froms.is_empty(), !tos.is_empty()),
                });
                continue;
            }

            let (mut created, mut existing) = (0, 0);
            for &from in &froms {
                for &to in &tos {
                    if !state.edge_index.insert((spec.rel_type.clone(), from, to)) {
                        existing += 1;
                        continue;
                    }
                    let id = state.edges.len();
                    state.edges.push(Edge {
                        rel_type: spec.rel_type.clone(),
                        to,
                        properties: spec.properties.clone(),
                    });
                    state.outgoing.entry(from).or_default().push(id);
                    created += 1;
                }
            }
            report
                .outcomes
                .push(RelationshipOutcome::Merged { created, existing });
        }

        debug!(
            created = report.created(),
            missing = report.missing_endpoints().len(),
            "Relationships merged"
        );
        Ok(report)
    }

    async fn query(&self, query: &GraphQuery) -> Result<Vec<GraphRow>> {
        query.validate()?;

        let state = self.state.read().await;
        let mut rows = Vec::new();
        for start in 0..state.nodes.len() {
            if !state.label_matches(start, query.start.label.as_deref()) {
                continue;
            }
            let mut path = Path {
                nodes: vec![start],
                edges: Vec::new(),
            };
            state.walk(query, &mut path, &mut rows);
        }

        if !query.order_by.is_empty() {
            rows.sort_by(|a, b| {
                query
                    .order_by
                    .iter()
                    .map(|column| {
                        let null = Value::Null;
                        compare_values(
                            a.get(column).unwrap_or(&null),
                            b.get(column).unwrap_or(&null),
                        )
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
