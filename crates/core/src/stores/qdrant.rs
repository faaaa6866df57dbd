use crate::error::StoreError;
use crate::traits::{VectorIndex, VectorMatch};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// REST client for a Qdrant collection. The vector size is fixed at
/// construction; every write and query is checked against it before a
/// request is made.
pub struct QdrantIndex {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantIndex {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.vector_size {
            return Err(StoreError::DimensionMismatch {
                expected: self.vector_size,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Creates the collection if it does not already exist. A 409 from
    /// Qdrant means it is already there, which is fine.
    pub async fn ensure_collection(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .put(format!("{}/collections/{}", self.endpoint, self.collection))
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" },
            }))
            .send()
            .await?;

        if !response.status().is_success() && response.status().as_u16() != 409 {
            return Err(StoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }
}

/// Translates a flat `{field: value}` object into Qdrant's filter DSL.
fn match_filter(filter: &Value) -> Value {
    let must: Vec<Value> = match filter {
        Value::Object(fields) => fields
            .iter()
            .map(|(key, value)| json!({ "key": key, "match": { "value": value } }))
            .collect(),
        _ => Vec::new(),
    };
    json!({ "must": must })
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(
        &self,
        vector_id: &str,
        vector: &[f32],
        metadata: Value,
    ) -> Result<(), StoreError> {
        self.upsert_batch(&[(vector_id.to_string(), vector.to_vec(), metadata)])
            .await
    }

    async fn upsert_batch(&self, points: &[(String, Vec<f32>, Value)]) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let body = points
            .iter()
            .map(|(vector_id, vector, metadata)| {
                self.check_dimensions(vector)?;
                Ok(json!({
                    "id": vector_id,
                    "vector": vector,
                    "payload": metadata,
                }))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "points": body }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<Value>,
    ) -> Result<Vec<VectorMatch>, StoreError> {
        self.check_dimensions(vector)?;

        let mut body = json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(filter) = &filter {
            body["filter"] = match_filter(filter);
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            ))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut matches = Vec::new();
        for hit in hits {
            let vector_id = match hit.pointer("/id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => continue,
            };
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
            let metadata = hit.pointer("/payload").cloned().unwrap_or(Value::Null);

            matches.push(VectorMatch {
                vector_id,
                score,
                metadata,
            });
        }

        Ok(matches)
    }

    async fn delete_by_id(&self, vector_id: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/delete?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "points": [vector_id] }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn delete_by_filter(&self, filter: Value) -> Result<(), StoreError> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/delete?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "filter": match_filter(&filter) }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dimension_check_rejects_short_vectors() {
        let index = QdrantIndex::new("http://localhost:6333", "chunks", 128);
        assert!(matches!(
            index.check_dimensions(&[0.0; 64]),
            Err(StoreError::DimensionMismatch {
                expected: 128,
                actual: 64
            })
        ));
        assert!(index.check_dimensions(&[0.0; 128]).is_ok());
    }

    #[test]
    fn flat_filter_becomes_must_clauses() {
        let filter = match_filter(&json!({"document_id": "doc-1"}));
        assert_eq!(filter["must"][0]["key"], "document_id");
        assert_eq!(filter["must"][0]["match"]["value"], "doc-1");
    }
}
