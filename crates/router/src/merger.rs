//! Combining graph rows and vector hits into one ranked list

use strata_common::models::{GraphRow, RankingPolicy, SearchHit};

/// Score given to graph rows under [`RankingPolicy::GraphFirst`]. Exact structural matches
/// rank above any similarity score.
pub const GRAPH_SENTINEL_SCORE: f32 = 1.0;

/// Merges the two result sets of a query
#[derive(Debug, Clone, Copy)]
pub struct ResultMerger {
    /// Score graph rows get under [`RankingPolicy::Blended`]
    pub graph_score: f32,
}

impl Default for ResultMerger {
    fn default() -> Self {
        Self { graph_score: 0.75 }
    }
}

impl ResultMerger {
    pub fn new(graph_score: f32) -> Self {
        Self { graph_score }
    }

    /// Graph rows keep their query order. Vector hits are ordered by descending score.
    ///
    /// * `GraphFirst`: every graph row, then every vector hit.
    /// * `Blended`: graph rows scored at `graph_score`, one descending sort over both;
    ///   a graph row wins a tie with a vector hit.
    pub fn merge(
        &self,
        graph_rows: Vec<GraphRow>,
        vector_hits: Vec<SearchHit>,
        ranking: RankingPolicy,
    ) -> Vec<SearchHit> {
        let graph_score = match ranking {
            RankingPolicy::GraphFirst => GRAPH_SENTINEL_SCORE,
            RankingPolicy::Blended => self.graph_score,
        };

        let mut vector_hits = vector_hits;
        sort_by_score(&mut vector_hits);

        let mut hits: Vec<SearchHit> = graph_rows
            .into_iter()
            .map(|row| SearchHit::graph(graph_score, row))
            .collect();
        hits.extend(vector_hits);

        if ranking == RankingPolicy::Blended {
            // stable, so graph rows stay ahead of equal-scored vector hits
            sort_by_score(&mut hits);
        }
        hits
    }
}

fn sort_by_score(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
}
