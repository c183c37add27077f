//! Question → QueryPlan

use super::template::{compile_pattern, group_names};
use crate::plan::QueryPlan;
use regex::Regex;
use serde_json::Value;
use strata_common::config::QueryRuleConfig;
use strata_common::errors::{AppError, Result};
use strata_common::models::{GraphQuery, RankingPolicy};
use tracing::debug;

struct QueryRule {
    name: String,
    regex: Regex,
    query: GraphQuery,
    /// (parameter, capture group)
    bind: Vec<(String, String)>,
    ranking: Option<RankingPolicy>,
}

impl QueryRule {
    fn compile(config: &QueryRuleConfig) -> Result<Self> {
        let rule = config.name.as_str();
        let config_error = |message: String| AppError::Configuration {
            message: format!("rule '{}': {}", rule, message),
        };

        let regex = compile_pattern(rule, &config.pattern)?;
        let groups = group_names(&regex);

        for (param, group) in &config.bind {
            if !groups.contains(group) {
                return Err(config_error(format!(
                    "parameter ${} binds unknown capture group '{}'",
                    param, group
                )));
            }
        }

        // Check the template as it will run, with every bound parameter present
        let mut candidate = config.query.clone();
        for param in config.bind.keys() {
            candidate
                .params
                .entry(param.clone())
                .or_insert_with(|| Value::String(String::new()));
        }
        candidate.validate().map_err(|e| config_error(e.to_string()))?;

        Ok(Self {
            name: config.name.clone(),
            regex,
            query: config.query.clone(),
            bind: config
                .bind
                .iter()
                .map(|(p, g)| (p.clone(), g.clone()))
                .collect(),
            ranking: config.ranking,
        })
    }

    /// The rule's query with captures bound, or None if the question does not match or a bound
    /// capture is empty
    fn instantiate(&self, question: &str) -> Option<GraphQuery> {
        let captures = self.regex.captures(question)?;
        let mut query = self.query.clone();
        for (param, group) in &self.bind {
            let value = captures.name(group)?.as_str().trim();
            if value.is_empty() {
                return None;
            }
            query
                .params
                .insert(param.clone(), Value::String(value.to_string()));
        }
        Some(query)
    }
}

/// Rule-table classifier for questions
///
/// Vector search is always requested for a non-blank question. The first rule whose intent
/// pattern matches adds its graph query, with capture groups bound as query parameters.
pub struct QueryClassifier {
    rules: Vec<QueryRule>,
    default_ranking: RankingPolicy,
}

impl QueryClassifier {
    /// Compile and check a rule table; any invalid rule is a configuration error
    pub fn new(rules: &[QueryRuleConfig], default_ranking: RankingPolicy) -> Result<Self> {
        let rules = rules
            .iter()
            .map(QueryRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rules,
            default_ranking,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn classify(&self, question: &str) -> QueryPlan {
        let text = question.trim();
        if text.is_empty() {
            return QueryPlan::empty();
        }

        for rule in &self.rules {
            if let Some(query) = rule.instantiate(text) {
                debug!(rule = %rule.name, query = %query, "Query rule matched");
                return QueryPlan {
                    use_vector: true,
                    use_graph: true,
                    graph_query: Some(query),
                    vector_query_text: text.to_string(),
                    ranking: rule.ranking.unwrap_or(self.default_ranking),
                    matched_rule: Some(rule.name.clone()),
                };
            }
        }

        QueryPlan::vector_only(text, self.default_ranking)
    }
}
