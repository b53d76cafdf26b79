//! Provenance graph: one item per identity, one append-only link per discovery.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            item::{Item, COMMENT_SEPARATOR},
            link::Link,
            StoredObject,
        },
    },
    utils::identity::ContentId,
};

const MERGE_COMMENT: &str = "
    UPDATE type::thing('item', $id) SET
        comments = string::concat(comments, $separator, $extra),
        updated_at = time::now();
";

#[async_trait]
pub trait ProvenanceGraph: Send + Sync {
    /// Inserts `item` unless its identity is already known; returns whether this call created it.
    async fn ensure_item(&self, item: Item) -> Result<bool, AppError>;

    /// Appends a discovery edge. Never deduplicates.
    async fn add_link(&self, link: Link) -> Result<(), AppError>;

    /// Appends `extra` to the audit trail of an existing item.
    async fn merge_comment(&self, id: ContentId, extra: &str) -> Result<(), AppError>;

    async fn get_item(&self, id: ContentId) -> Result<Option<Item>, AppError>;

    async fn links_to(&self, child: ContentId) -> Result<Vec<Link>, AppError>;

    async fn links_from(&self, parent: ContentId) -> Result<Vec<Link>, AppError>;
}

/// [`ProvenanceGraph`] backed by the `item` and `link` tables.
#[derive(Clone)]
pub struct SurrealProvenanceGraph {
    db: Arc<SurrealDbClient>,
}

impl SurrealProvenanceGraph {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &SurrealDbClient {
        &self.db
    }
}

#[async_trait]
impl ProvenanceGraph for SurrealProvenanceGraph {
    async fn ensure_item(&self, item: Item) -> Result<bool, AppError> {
        let id = item.id.clone();
        if self.db.get_item::<Item>(&id).await?.is_some() {
            return Ok(false);
        }

        // CREATE on a fixed record id is insert-if-absent: a concurrent
        // discovery of the same identity loses here and sees the winner's row.
        match self.db.store_item(item).await {
            Ok(_) => Ok(true),
            Err(err) => {
                if self.db.get_item::<Item>(&id).await?.is_some() {
                    debug!(item_id = %id, "item created concurrently by another discovery");
                    Ok(false)
                } else {
                    Err(AppError::from(err))
                }
            }
        }
    }

    async fn add_link(&self, link: Link) -> Result<(), AppError> {
        link.store_link(&self.db).await
    }

    async fn merge_comment(&self, id: ContentId, extra: &str) -> Result<(), AppError> {
        let updated: Option<Item> = self
            .db
            .query(MERGE_COMMENT)
            .bind(("id", id.to_hex()))
            .bind(("separator", COMMENT_SEPARATOR))
            .bind(("extra", extra.to_string()))
            .await?
            .take(0)?;

        match updated {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!(
                "{} {id} not found while merging comment",
                Item::table_name()
            ))),
        }
    }

    async fn get_item(&self, id: ContentId) -> Result<Option<Item>, AppError> {
        Ok(self.db.get_item::<Item>(&id.to_hex()).await?)
    }

    async fn links_to(&self, child: ContentId) -> Result<Vec<Link>, AppError> {
        Link::links_to(child, &self.db).await
    }

    async fn links_from(&self, parent: ContentId) -> Result<Vec<Link>, AppError> {
        Link::links_from(parent, &self.db).await
    }
}
