use crate::models::{Chunk, Entity, EntityKind, ExtractedEntity, GraphEdge, GraphNode};
use crate::traits::{DocumentStore, LanguageModel};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Entities below this relevance (1-10 scale) are discarded.
    pub min_entity_relevance: f64,
    /// The entity map is truncated to this many entries, best first.
    pub max_entities: usize,
    /// Node pairs must co-occur in at least this many chunks.
    pub min_cooccurrence: usize,
    /// Below this many co-occurrence edges the semantic fallback runs.
    pub min_edges_before_fallback: usize,
    /// Nodes offered to the semantic fallback, best first.
    pub semantic_candidates: usize,
    /// Chunks extracted concurrently per batch.
    pub batch_size: usize,
    /// Pause between extraction batches, a crude rate limit.
    pub batch_delay: Duration,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            min_entity_relevance: 5.0,
            max_entities: 50,
            min_cooccurrence: 2,
            min_edges_before_fallback: 5,
            semantic_candidates: 10,
            batch_size: 5,
            batch_delay: Duration::from_millis(1_000),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphSummary {
    pub chunks_processed: usize,
    pub chunks_failed: usize,
    pub entity_count: usize,
    pub edge_count: usize,
    pub ai_edge_count: usize,
}

/// Result of one graph build. `error` is populated instead of failing
/// the build; document ingestion never aborts because of the graph.
#[derive(Debug, Clone, Default)]
pub struct GraphOutcome {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub summary: GraphSummary,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SemanticRelation {
    entity1: String,
    entity2: String,
    relationship: String,
    confidence: f64,
}

/// Derives a per-document entity co-occurrence graph from chunk text,
/// using the language-model collaborator for entity extraction and for
/// semantic edges when co-occurrence alone is too sparse.
pub struct GraphBuilder {
    config: GraphConfig,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    pub async fn build<L, S>(
        &self,
        llm: &L,
        store: &S,
        chunks: &[Chunk],
        document_id: &str,
    ) -> GraphOutcome
    where
        L: LanguageModel + Sync,
        S: DocumentStore + Sync,
    {
        match self.build_inner(llm, store, chunks, document_id).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(document_id, %error, "graph build failed, returning empty graph");
                GraphOutcome {
                    error: Some(error.to_string()),
                    ..Default::default()
                }
            }
        }
    }

    async fn build_inner<L, S>(
        &self,
        llm: &L,
        store: &S,
        chunks: &[Chunk],
        document_id: &str,
    ) -> Result<GraphOutcome, crate::error::StoreError>
    where
        L: LanguageModel + Sync,
        S: DocumentStore + Sync,
    {
        let mut summary = GraphSummary::default();

        let entities = self.extract_entities(llm, chunks, &mut summary).await;
        summary.entity_count = entities.len();

        if entities.is_empty() {
            debug!(document_id, "no entities above relevance threshold");
            return Ok(GraphOutcome {
                summary,
                ..Default::default()
            });
        }

        let nodes = self.persist_nodes(store, &entities, document_id).await;

        let mut edges = self
            .cooccurrence_edges(store, &nodes, chunks, document_id)
            .await;
        summary.edge_count = edges.len();

        if edges.len() < self.config.min_edges_before_fallback && nodes.len() >= 2 {
            let semantic = self.semantic_edges(llm, store, &nodes, document_id).await;
            summary.ai_edge_count = semantic.len();
            summary.edge_count += semantic.len();
            edges.extend(semantic);
        }

        info!(
            document_id,
            entities = summary.entity_count,
            nodes = nodes.len(),
            edges = summary.edge_count,
            ai_edges = summary.ai_edge_count,
            "graph build complete"
        );

        Ok(GraphOutcome {
            nodes,
            edges,
            summary,
            error: None,
        })
    }

    /// Stage 1: batched extraction with a fixed inter-batch pause.
    /// Results are reassembled by chunk index, so completion order
    /// within a batch does not matter.
    async fn extract_entities<L>(
        &self,
        llm: &L,
        chunks: &[Chunk],
        summary: &mut GraphSummary,
    ) -> Vec<Entity>
    where
        L: LanguageModel + Sync,
    {
        let mut merged: HashMap<(String, EntityKind), Entity> = HashMap::new();
        let batch_size = self.config.batch_size.max(1);

        for (batch_number, batch) in chunks.chunks(batch_size).enumerate() {
            if batch_number > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let extractions = join_all(batch.iter().map(|chunk| async move {
                (chunk.index, llm.extract_entities(&chunk.content).await)
            }))
            .await;

            for (chunk_index, extraction) in extractions {
                match extraction {
                    Ok(observed) => {
                        summary.chunks_processed += 1;
                        for entity in observed {
                            if entity.relevance < self.config.min_entity_relevance {
                                continue;
                            }
                            merge_observation(&mut merged, entity, chunk_index);
                        }
                    }
                    Err(error) => {
                        summary.chunks_failed += 1;
                        warn!(chunk_index, %error, "entity extraction failed for chunk");
                    }
                }
            }
        }

        let mut entities: Vec<Entity> = merged.into_values().collect();
        entities.sort_by(|left, right| right.relevance.total_cmp(&left.relevance));
        entities.truncate(self.config.max_entities);
        entities
    }

    /// Stage 2: one persisted node per surviving entity. A node that
    /// fails to persist is dropped from the graph, not fatal.
    async fn persist_nodes<S>(
        &self,
        store: &S,
        entities: &[Entity],
        document_id: &str,
    ) -> Vec<GraphNode>
    where
        S: DocumentStore + Sync,
    {
        let mut nodes = Vec::new();

        for entity in entities {
            let node = GraphNode {
                node_id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                name: entity.name.clone(),
                kind: entity.kind,
                relevance: entity.relevance,
                size: (10.0 + entity.relevance * 2.0).min(30.0),
                color: color_for(entity.kind).to_string(),
                source_chunks: entity.source_chunks.clone(),
            };

            match store.create_graph_node(&node).await {
                Ok(()) => nodes.push(node),
                Err(error) => warn!(name = %entity.name, %error, "failed to persist graph node"),
            }
        }

        nodes
    }

    /// Stage 3: count unordered node pairs appearing in the same chunk
    /// (case-insensitive substring match) and keep well-supported pairs.
    async fn cooccurrence_edges<S>(
        &self,
        store: &S,
        nodes: &[GraphNode],
        chunks: &[Chunk],
        document_id: &str,
    ) -> Vec<GraphEdge>
    where
        S: DocumentStore + Sync,
    {
        let lowered_names: Vec<(usize, String)> = nodes
            .iter()
            .enumerate()
            .map(|(position, node)| (position, node.name.to_lowercase()))
            .collect();

        let mut pair_counts: HashMap<(usize, usize), usize> = HashMap::new();

        for chunk in chunks {
            let content = chunk.content.to_lowercase();
            let present: Vec<usize> = lowered_names
                .iter()
                .filter(|(_, name)| content.contains(name.as_str()))
                .map(|(position, _)| *position)
                .collect();

            for (slot, &first) in present.iter().enumerate() {
                for &second in &present[slot + 1..] {
                    // Count each unordered pair once, whichever
                    // orientation was seen first.
                    if let Some(count) = pair_counts.get_mut(&(second, first)) {
                        *count += 1;
                    } else {
                        *pair_counts.entry((first, second)).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut edges = Vec::new();
        for ((first, second), count) in pair_counts {
            if count < self.config.min_cooccurrence {
                continue;
            }

            let edge = GraphEdge {
                edge_id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                source: nodes[first].node_id.clone(),
                target: nodes[second].node_id.clone(),
                relationship: relationship_label(nodes[first].kind, nodes[second].kind).to_string(),
                weight: count as f64,
                ai_generated: false,
            };

            match store.create_graph_edge(&edge).await {
                Ok(()) => edges.push(edge),
                Err(error) => warn!(%error, "failed to persist co-occurrence edge"),
            }
        }

        edges
    }

    /// Stage 4: ask the model to propose relationships among the top
    /// nodes. Anything malformed is discarded without complaint.
    async fn semantic_edges<L, S>(
        &self,
        llm: &L,
        store: &S,
        nodes: &[GraphNode],
        document_id: &str,
    ) -> Vec<GraphEdge>
    where
        L: LanguageModel + Sync,
        S: DocumentStore + Sync,
    {
        let candidates = &nodes[..nodes.len().min(self.config.semantic_candidates)];
        let listing = candidates
            .iter()
            .map(|node| format!("- {} ({})", node.name, node.kind.as_str()))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Given these entities extracted from one document:\n{listing}\n\n\
             Propose 3 to 5 plausible relationships between them. Respond with only a \
             JSON array of objects with keys \"entity1\", \"entity2\", \"relationship\", \
             and \"confidence\" (1-10). Use the entity names exactly as written."
        );

        let response = match llm.complete(&prompt, 0.3).await {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, "semantic edge inference failed");
                return Vec::new();
            }
        };

        let relations = match parse_semantic_relations(&response) {
            Some(relations) => relations,
            None => {
                debug!(document_id, "unparseable semantic edge response discarded");
                return Vec::new();
            }
        };

        let mut edges = Vec::new();
        for relation in relations {
            let source = candidates.iter().find(|node| node.name == relation.entity1);
            let target = candidates.iter().find(|node| node.name == relation.entity2);

            let (source, target) = match (source, target) {
                (Some(source), Some(target)) if source.node_id != target.node_id => {
                    (source, target)
                }
                _ => continue,
            };

            let edge = GraphEdge {
                edge_id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                source: source.node_id.clone(),
                target: target.node_id.clone(),
                relationship: relation.relationship.clone(),
                weight: relation.confidence / 10.0,
                ai_generated: true,
            };

            match store.create_graph_edge(&edge).await {
                Ok(()) => edges.push(edge),
                Err(error) => warn!(%error, "failed to persist semantic edge"),
            }
        }

        edges
    }
}

/// Folds one observation into the dedup map. Repeat observations average
/// the stored relevance with the new one (a two-value mean, biased
/// toward recent observations) and record the source chunk.
fn merge_observation(
    merged: &mut HashMap<(String, EntityKind), Entity>,
    observed: ExtractedEntity,
    chunk_index: usize,
) {
    let key = (observed.name.to_lowercase(), observed.kind);

    match merged.get_mut(&key) {
        Some(existing) => {
            existing.count += 1;
            existing.relevance = (existing.relevance + observed.relevance) / 2.0;
            existing.source_chunks.insert(chunk_index);
        }
        None => {
            let mut source_chunks = BTreeSet::new();
            source_chunks.insert(chunk_index);
            merged.insert(
                key,
                Entity {
                    name: observed.name,
                    kind: observed.kind,
                    relevance: observed.relevance,
                    count: 1,
                    source_chunks,
                },
            );
        }
    }
}

fn parse_semantic_relations(response: &str) -> Option<Vec<SemanticRelation>> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end <= start {
        return None;
    }

    let body = &response[start..=end];
    match serde_json::from_str::<Vec<SemanticRelation>>(body) {
        Ok(relations) => Some(relations),
        Err(_) => {
            // Some models wrap the array in an object; try that shape too.
            serde_json::from_str::<Value>(response)
                .ok()
                .and_then(|value| value.get("relationships").cloned())
                .and_then(|value| serde_json::from_value(value).ok())
        }
    }
}

fn color_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Person => "#e07a5f",
        EntityKind::Organization => "#3d6fb4",
        EntityKind::Concept => "#8e6fc1",
        EntityKind::Topic => "#5f9e6e",
        EntityKind::Location => "#d4a24c",
    }
}

fn relationship_label(first: EntityKind, second: EntityKind) -> &'static str {
    use EntityKind::*;

    let lookup = |left: EntityKind, right: EntityKind| -> Option<&'static str> {
        match (left, right) {
            (Person, Person) => Some("collaborates_with"),
            (Person, Organization) => Some("affiliated_with"),
            (Person, Location) => Some("located_in"),
            (Person, Concept) => Some("works_on"),
            (Person, Topic) => Some("writes_about"),
            (Organization, Organization) => Some("partners_with"),
            (Organization, Location) => Some("based_in"),
            (Organization, Concept) => Some("develops"),
            (Organization, Topic) => Some("focuses_on"),
            (Concept, Concept) => Some("related_to"),
            (Concept, Topic) => Some("belongs_to"),
            (Topic, Topic) => Some("overlaps_with"),
            (Location, Location) => Some("near"),
            _ => None,
        }
    };

    lookup(first, second)
        .or_else(|| lookup(second, first))
        .unwrap_or("associated_with")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::stores::memory::InMemoryDocumentStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        entities_by_chunk: Vec<Vec<ExtractedEntity>>,
        completion: String,
        completion_calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(entities_by_chunk: Vec<Vec<ExtractedEntity>>, completion: &str) -> Self {
            Self {
                entities_by_chunk,
                completion: completion.to_string(),
                completion_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, StoreError> {
            if text.contains("POISON") {
                return Err(StoreError::Request("scripted extraction failure".to_string()));
            }
            // Look the chunk up by a marker of the form "#N " at the start.
            let index = text
                .split('#')
                .nth(1)
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|digits| digits.parse::<usize>().ok())
                .unwrap_or(0);
            Ok(self
                .entities_by_chunk
                .get(index)
                .cloned()
                .unwrap_or_default())
        }

        async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String, StoreError> {
            self.completion_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.completion.clone())
        }
    }

    fn entity(name: &str, kind: EntityKind, relevance: f64) -> ExtractedEntity {
        ExtractedEntity {
            name: name.to_string(),
            kind,
            relevance,
        }
    }

    fn chunk(index: usize, content: &str) -> Chunk {
        let content = format!("#{index} {content}");
        Chunk {
            start: index * 100,
            end: index * 100 + content.chars().count(),
            content,
            index,
        }
    }

    fn quick_config() -> GraphConfig {
        GraphConfig {
            batch_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn entities_deduplicate_with_two_value_mean() {
        let model = ScriptedModel::new(
            vec![
                vec![entity("Alpha", EntityKind::Concept, 8.0)],
                vec![entity("alpha", EntityKind::Concept, 6.0)],
            ],
            "[]",
        );
        let store = InMemoryDocumentStore::default();
        let builder = GraphBuilder::new(quick_config());

        let chunks = vec![chunk(0, "Alpha appears here"), chunk(1, "alpha appears again")];
        let outcome = builder.build(&model, &store, &chunks, "doc-1").await;

        assert_eq!(outcome.nodes.len(), 1);
        assert_eq!(outcome.summary.entity_count, 1);
        let node = &outcome.nodes[0];
        assert_eq!(node.relevance, 7.0);
        assert_eq!(node.source_chunks.len(), 2);
    }

    #[tokio::test]
    async fn low_relevance_entities_are_discarded() {
        let model = ScriptedModel::new(
            vec![vec![
                entity("Kept", EntityKind::Topic, 6.0),
                entity("Dropped", EntityKind::Topic, 4.0),
            ]],
            "[]",
        );
        let store = InMemoryDocumentStore::default();
        let builder = GraphBuilder::new(quick_config());

        let outcome = builder
            .build(&model, &store, &[chunk(0, "Kept and Dropped")], "doc-1")
            .await;

        assert_eq!(outcome.nodes.len(), 1);
        assert_eq!(outcome.nodes[0].name, "Kept");
    }

    #[tokio::test]
    async fn cooccurrence_needs_minimum_support() {
        let shared = vec![
            entity("Alpha", EntityKind::Concept, 9.0),
            entity("Beta", EntityKind::Concept, 8.0),
            entity("Gamma", EntityKind::Concept, 7.0),
        ];
        let model = ScriptedModel::new(
            vec![shared.clone(), shared.clone(), shared],
            "not json at all",
        );
        let store = InMemoryDocumentStore::default();
        let builder = GraphBuilder::new(quick_config());

        let chunks = vec![
            chunk(0, "Alpha works alongside Beta on the project"),
            chunk(1, "Alpha and Beta shipped the release"),
            chunk(2, "Beta briefly consulted Gamma"),
        ];
        let outcome = builder.build(&model, &store, &chunks, "doc-1").await;

        let cooccurrence: Vec<_> = outcome
            .edges
            .iter()
            .filter(|edge| !edge.ai_generated)
            .collect();
        assert_eq!(cooccurrence.len(), 1);
        assert_eq!(cooccurrence[0].weight, 2.0);
        assert_eq!(cooccurrence[0].relationship, "related_to");

        // The malformed semantic response is discarded silently.
        assert_eq!(outcome.summary.ai_edge_count, 0);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn semantic_fallback_fills_sparse_graphs() {
        let completion = r#"Here you go:
[
  {"entity1": "Alpha", "entity2": "Beta", "relationship": "supports", "confidence": 8},
  {"entity1": "Alpha", "entity2": "Unknown", "relationship": "uses", "confidence": 9},
  {"entity1": "Beta", "entity2": "Beta", "relationship": "self", "confidence": 5}
]"#;
        let model = ScriptedModel::new(
            vec![vec![
                entity("Alpha", EntityKind::Concept, 9.0),
                entity("Beta", EntityKind::Organization, 8.0),
            ]],
            completion,
        );
        let store = InMemoryDocumentStore::default();
        let builder = GraphBuilder::new(quick_config());

        // Names never co-occur in chunk text, so the counting pass
        // produces nothing and the fallback must run.
        let outcome = builder
            .build(&model, &store, &[chunk(0, "unrelated filler text")], "doc-1")
            .await;

        assert_eq!(outcome.edges.len(), 1);
        let edge = &outcome.edges[0];
        assert!(edge.ai_generated);
        assert_eq!(edge.relationship, "supports");
        assert!((edge.weight - 0.8).abs() < f64::EPSILON);
        assert_eq!(outcome.summary.ai_edge_count, 1);
    }

    #[tokio::test]
    async fn failed_chunks_are_skipped_not_fatal() {
        let model = ScriptedModel::new(
            vec![
                vec![entity("Alpha", EntityKind::Concept, 9.0)],
                Vec::new(),
                vec![entity("Beta", EntityKind::Concept, 8.0)],
            ],
            "[]",
        );
        let store = InMemoryDocumentStore::default();
        let builder = GraphBuilder::new(quick_config());

        let chunks = vec![
            chunk(0, "Alpha is mentioned"),
            chunk(1, "POISON makes extraction fail"),
            chunk(2, "Beta is mentioned"),
        ];
        let outcome = builder.build(&model, &store, &chunks, "doc-1").await;

        assert_eq!(outcome.summary.chunks_processed, 2);
        assert_eq!(outcome.summary.chunks_failed, 1);
        assert_eq!(outcome.nodes.len(), 2);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn empty_chunks_make_an_empty_graph() {
        let model = ScriptedModel::new(Vec::new(), "[]");
        let store = InMemoryDocumentStore::default();
        let builder = GraphBuilder::new(quick_config());

        let outcome = builder.build(&model, &store, &[], "doc-1").await;

        assert!(outcome.nodes.is_empty());
        assert!(outcome.edges.is_empty());
        assert!(outcome.error.is_none());
        assert_eq!(model.completion_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn entity_list_is_capped_at_fifty() {
        let many: Vec<ExtractedEntity> = (0..80)
            .map(|number| {
                entity(
                    &format!("Entity{number}"),
                    EntityKind::Concept,
                    5.0 + (number % 5) as f64,
                )
            })
            .collect();
        let model = ScriptedModel::new(vec![many], "[]");
        let store = InMemoryDocumentStore::default();
        let builder = GraphBuilder::new(quick_config());

        let outcome = builder
            .build(&model, &store, &[chunk(0, "many entities")], "doc-1")
            .await;

        assert_eq!(outcome.nodes.len(), 50);
    }

    #[test]
    fn node_size_is_clamped() {
        let relevance = 10.0;
        assert_eq!((10.0 + relevance * 2.0_f64).min(30.0), 30.0);
    }

    #[test]
    fn relationship_lookup_checks_both_orientations() {
        assert_eq!(
            relationship_label(EntityKind::Organization, EntityKind::Person),
            "affiliated_with"
        );
        assert_eq!(
            relationship_label(EntityKind::Person, EntityKind::Organization),
            "affiliated_with"
        );
        assert_eq!(
            relationship_label(EntityKind::Location, EntityKind::Topic),
            "associated_with"
        );
    }
}
