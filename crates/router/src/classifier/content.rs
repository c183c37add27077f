//! Content → IngestPlan

use super::template::{
    compile_pattern, group_names, parse_properties, render_properties, PropertyTemplate, Template,
};
use crate::plan::IngestPlan;
use regex::{Captures, Regex};
use std::collections::HashSet;
use strata_common::config::IngestRuleConfig;
use strata_common::errors::{AppError, Result};
use strata_common::identifier::{validate_identifier, IdentifierKind};
use strata_common::models::{Content, GraphEntitySpec, GraphRelationshipSpec};
use tracing::debug;

struct EntityRule {
    label: String,
    name: Template,
    properties: Vec<(String, PropertyTemplate)>,
}

struct RelationshipRule {
    rel_type: String,
    from: Template,
    to: Template,
    properties: Vec<(String, PropertyTemplate)>,
}

struct IngestRule {
    name: String,
    regex: Regex,
    entities: Vec<EntityRule>,
    relationships: Vec<RelationshipRule>,
}

/// What one rule extracted from one match
struct Extraction {
    entities: Vec<GraphEntitySpec>,
    relationships: Vec<GraphRelationshipSpec>,
}

impl IngestRule {
    fn compile(config: &IngestRuleConfig) -> Result<Self> {
        let rule = config.name.as_str();
        let regex = compile_pattern(rule, &config.pattern)?;
        let groups = group_names(&regex);
        let identifier = |kind: IdentifierKind, value: &str| {
            validate_identifier(kind, value).map_err(|e| AppError::Configuration {
                message: format!("rule '{}': {}", rule, e),
            })
        };

        let entities = config
            .entities
            .iter()
            .map(|t| -> Result<EntityRule> {
                identifier(IdentifierKind::Label, &t.label)?;
                Ok(EntityRule {
                    label: t.label.clone(),
                    name: Template::parse(rule, &t.name, &groups)?,
                    properties: parse_properties(rule, &t.properties, &groups)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let relationships = config
            .relationships
            .iter()
            .map(|t| -> Result<RelationshipRule> {
                identifier(IdentifierKind::RelationshipType, &t.rel_type)?;
                Ok(RelationshipRule {
                    rel_type: t.rel_type.clone(),
                    from: Template::parse(rule, &t.from, &groups)?,
                    to: Template::parse(rule, &t.to, &groups)?,
                    properties: parse_properties(rule, &t.properties, &groups)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: config.name.clone(),
            regex,
            entities,
            relationships,
        })
    }

    /// None when any substituted name comes out empty
    fn extract(&self, captures: &Captures<'_>) -> Option<Extraction> {
        let mut entities = Vec::with_capacity(self.entities.len());
        for rule in &self.entities {
            let name = rule.name.render(captures);
            if name.is_empty() {
                return None;
            }
            entities.push(GraphEntitySpec {
                label: rule.label.clone(),
                name,
                properties: render_properties(&rule.properties, captures),
            });
        }

        let mut relationships = Vec::with_capacity(self.relationships.len());
        for rule in &self.relationships {
            let from_name = rule.from.render(captures);
            let to_name = rule.to.render(captures);
            if from_name.is_empty() || to_name.is_empty() {
                return None;
            }
            relationships.push(GraphRelationshipSpec {
                rel_type: rule.rel_type.clone(),
                from_name,
                to_name,
                properties: render_properties(&rule.properties, captures),
            });
        }

        Some(Extraction {
            entities,
            relationships,
        })
    }
}

/// Rule-table classifier for incoming content
///
/// Rules are tried in order. The first rule that yields graph artifacts decides extraction; all
/// of its matches in the text contribute, deduplicated in first-seen order. Every non-blank
/// piece of content goes to the vector store.
pub struct ContentClassifier {
    rules: Vec<IngestRule>,
}

impl ContentClassifier {
    /// Compile and check a rule table; any invalid rule is a configuration error
    pub fn new(rules: &[IngestRuleConfig]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(IngestRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn classify(&self, content: &Content) -> IngestPlan {
        if content.is_blank() {
            return IngestPlan::empty();
        }

        for rule in &self.rules {
            let mut entities: Vec<GraphEntitySpec> = Vec::new();
            let mut relationships: Vec<GraphRelationshipSpec> = Vec::new();
            let mut seen_entities = HashSet::new();
            let mut seen_relationships = HashSet::new();

            for captures in rule.regex.captures_iter(&content.text) {
                let Some(extraction) = rule.extract(&captures) else {
                    continue;
                };
                for entity in extraction.entities {
                    if seen_entities.insert((entity.label.clone(), entity.name.clone())) {
                        entities.push(entity);
                    }
                }
                for rel in extraction.relationships {
                    let key = (rel.rel_type.clone(), rel.from_name.clone(), rel.to_name.clone());
                    if seen_relationships.insert(key) {
                        relationships.push(rel);
                    }
                }
            }

            if entities.is_empty() && relationships.is_empty() {
                continue;
            }

            debug!(
                rule = %rule.name,
                entities = entities.len(),
                relationships = relationships.len(),
                "Content rule matched"
            );
            return IngestPlan {
                store_in_vector: true,
                store_in_graph: true,
                graph_entities: entities,
                graph_relationships: relationships,
                matched_rule: Some(rule.name.clone()),
            };
        }

        IngestPlan::vector_only()
    }
}
