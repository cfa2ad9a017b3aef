//! Corpus repository (spec §3): provider config normalizes `{}` to
//! `local_pgvector` with `top_k_default=5`.

use async_trait::async_trait;
use chrono::Utc;
use nexus_core::ids::{CorpusId, TenantId};
use nexus_core::model::{Corpus, ProviderConfig};
use nexus_core::{NexusError, Result};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait CorpusRepository: Send + Sync {
    async fn upsert(&self, corpus: Corpus) -> Result<Corpus>;
    async fn get(&self, tenant_id: &TenantId, id: &CorpusId) -> Result<Corpus>;
    async fn list(&self, tenant_id: &TenantId) -> Result<Vec<Corpus>>;
    async fn patch_provider_config(
        &self,
        tenant_id: &TenantId,
        id: &CorpusId,
        config: ProviderConfig,
    ) -> Result<Corpus>;
}

#[derive(sqlx::FromRow)]
struct CorpusRow {
    id: String,
    tenant_id: String,
    name: String,
    provider_config: serde_json::Value,
    created_at: chrono::DateTime<Utc>,
}

impl CorpusRow {
    fn into_corpus(self) -> Result<Corpus> {
        let provider_config: ProviderConfig = serde_json::from_value(self.provider_config)
            .map_err(|e| NexusError::Internal(format!("corrupt provider_config: {e}")))?;
        Ok(Corpus {
            id: CorpusId::new(self.id),
            tenant_id: TenantId::new(self.tenant_id),
            name: self.name,
            provider_config,
            created_at: self.created_at,
        })
    }
}

pub struct PgCorpusRepository {
    pool: PgPool,
}

impl PgCorpusRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CorpusRepository for PgCorpusRepository {
    async fn upsert(&self, corpus: Corpus) -> Result<Corpus> {
        let config_json = serde_json::to_value(&corpus.provider_config)
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        sqlx::query(
            "insert into corpora (id, tenant_id, name, provider_config, created_at) values ($1,$2,$3,$4,$5) \
             on conflict (id) do update set name = excluded.name, provider_config = excluded.provider_config",
        )
        .bind(corpus.id.as_str())
        .bind(corpus.tenant_id.as_str())
        .bind(&corpus.name)
        .bind(config_json)
        .bind(corpus.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(corpus)
    }

    async fn get(&self, tenant_id: &TenantId, id: &CorpusId) -> Result<Corpus> {
        let row: CorpusRow = sqlx::query_as("select * from corpora where tenant_id = $1 and id = $2")
            .bind(tenant_id.as_str())
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?
            .ok_or_else(|| NexusError::NotFound { resource_type: "corpus".into(), resource_id: id.as_str().to_string() })?;
        row.into_corpus()
    }

    async fn list(&self, tenant_id: &TenantId) -> Result<Vec<Corpus>> {
        let rows: Vec<CorpusRow> = sqlx::query_as("select * from corpora where tenant_id = $1 order by created_at desc")
            .bind(tenant_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        rows.into_iter().map(CorpusRow::into_corpus).collect()
    }

    async fn patch_provider_config(
        &self,
        tenant_id: &TenantId,
        id: &CorpusId,
        config: ProviderConfig,
    ) -> Result<Corpus> {
        let config_json = serde_json::to_value(&config).map_err(|e| NexusError::Internal(e.to_string()))?;
        sqlx::query("update corpora set provider_config = $3 where tenant_id = $1 and id = $2")
            .bind(tenant_id.as_str())
            .bind(id.as_str())
            .bind(config_json)
            .execute(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        self.get(tenant_id, id).await
    }
}

#[derive(Default)]
pub struct InMemoryCorpusRepository {
    corpora: RwLock<HashMap<(String, String), Corpus>>,
}

impl InMemoryCorpusRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(tenant_id: &TenantId, id: &CorpusId) -> (String, String) {
        (tenant_id.as_str().to_string(), id.as_str().to_string())
    }
}

#[async_trait]
impl CorpusRepository for InMemoryCorpusRepository {
    async fn upsert(&self, corpus: Corpus) -> Result<Corpus> {
        self.corpora.write().unwrap().insert(Self::key(&corpus.tenant_id, &corpus.id), corpus.clone());
        Ok(corpus)
    }

    async fn get(&self, tenant_id: &TenantId, id: &CorpusId) -> Result<Corpus> {
        self.corpora
            .read()
            .unwrap()
            .get(&Self::key(tenant_id, id))
            .cloned()
            .ok_or_else(|| NexusError::NotFound { resource_type: "corpus".into(), resource_id: id.as_str().to_string() })
    }

    async fn list(&self, tenant_id: &TenantId) -> Result<Vec<Corpus>> {
        Ok(self.corpora.read().unwrap().values().filter(|c| &c.tenant_id == tenant_id).cloned().collect())
    }

    async fn patch_provider_config(
        &self,
        tenant_id: &TenantId,
        id: &CorpusId,
        config: ProviderConfig,
    ) -> Result<Corpus> {
        let mut corpora = self.corpora.write().unwrap();
        let corpus = corpora.get_mut(&Self::key(tenant_id, id)).ok_or_else(|| NexusError::NotFound {
            resource_type: "corpus".into(),
            resource_id: id.as_str().to_string(),
        })?;
        corpus.provider_config = config;
        Ok(corpus.clone())
    }
}

/// Normalizes an absent/empty provider config to `local_pgvector` with
/// `top_k_default=5` (spec §3).
pub fn normalize_provider_config(config: Option<ProviderConfig>) -> ProviderConfig {
    config.unwrap_or(ProviderConfig::LocalPgvector { top_k_default: 5 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_normalizes_to_local_pgvector_top5() {
        let normalized = normalize_provider_config(None);
        match normalized {
            ProviderConfig::LocalPgvector { top_k_default } => assert_eq!(top_k_default, 5),
            _ => panic!("expected local_pgvector"),
        }
    }
}
