use crate::storage::types::item::deserialize_flexible_id;
use crate::{error::AppError, storage::db::SurrealDbClient, utils::identity::ContentId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const LINK_TABLE: &str = "link";

const RELATE_LINK: &str = r"
    LET $parent_node = type::thing('item', $parent);
    LET $child_node = type::thing('item', $child);
    RELATE $parent_node->link->$child_node CONTENT {
        id: type::thing('link', $id),
        path: $path,
        created_at: time::now()
    };
";

/// Discovery edge: `out` was found under `in_` at relative `path`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Link {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    #[serde(rename = "in", deserialize_with = "deserialize_flexible_id")]
    pub in_: String,
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub out: String,
    pub path: String,
}

impl Link {
    pub fn new(parent: ContentId, child: ContentId, path: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            in_: parent.to_hex(),
            out: child.to_hex(),
            path,
        }
    }

    pub fn parent(&self) -> Result<ContentId, AppError> {
        ContentId::from_hex(&self.in_)
    }

    pub fn child(&self) -> Result<ContentId, AppError> {
        ContentId::from_hex(&self.out)
    }

    /// Appends the edge. Identical edges are stored again on every call.
    pub async fn store_link(&self, db_client: &SurrealDbClient) -> Result<(), AppError> {
        db_client
            .query(RELATE_LINK)
            .bind(("id", self.id.clone()))
            .bind(("parent", self.in_.clone()))
            .bind(("child", self.out.clone()))
            .bind(("path", self.path.clone()))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn links_to(child: ContentId, db_client: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let links: Vec<Self> = db_client
            .query("SELECT * FROM link WHERE out = type::thing('item', $child)")
            .bind(("child", child.to_hex()))
            .await?
            .take(0)?;
        Ok(links)
    }

    pub async fn links_from(
        parent: ContentId,
        db_client: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let links: Vec<Self> = db_client
            .query("SELECT * FROM link WHERE in = type::thing('item', $parent) ORDER BY path")
            .bind(("parent", parent.to_hex()))
            .await?
            .take(0)?;
        Ok(links)
    }

    pub async fn count(db_client: &SurrealDbClient) -> Result<usize, AppError> {
        #[derive(Deserialize)]
        struct CountRow {
            count: usize,
        }

        let row: Option<CountRow> = db_client
            .query("SELECT count() AS count FROM link GROUP ALL")
            .await?
            .take(0)?;
        Ok(row.map_or(0, |row| row.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::item::Item;
    use chrono::Utc;
    use std::path::PathBuf;

    async fn setup_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized()
            .await
            .expect("Failed to initialize schema");
        db
    }

    async fn store_directory(db: &SurrealDbClient, path: &str) -> ContentId {
        let path = PathBuf::from(path);
        let id = ContentId::of_directory(&path);
        db.store_item(Item::directory(id, "Dir".into(), Utc::now(), &path))
            .await
            .expect("store directory item");
        id
    }

    #[test]
    fn link_creation_sets_hex_endpoints() {
        let parent = ContentId::ROOT;
        let child = ContentId::of_content(b"X");
        let link = Link::new(parent, child, "2021/jan/report.txt".into());

        assert_eq!(link.parent().expect("parent"), parent);
        assert_eq!(link.child().expect("child"), child);
        assert!(!link.id.is_empty());
    }

    #[tokio::test]
    async fn store_link_appends_identical_edges() {
        let db = setup_db().await;
        db.store_item(Item::root(&PathBuf::from("/docs")))
            .await
            .expect("store root");
        let dir = store_directory(&db, "/docs/jan").await;

        Link::new(ContentId::ROOT, dir, "jan".into())
            .store_link(&db)
            .await
            .expect("first link");
        Link::new(ContentId::ROOT, dir, "jan".into())
            .store_link(&db)
            .await
            .expect("second link");

        let incoming = Link::links_to(dir, &db).await.expect("links to dir");
        assert_eq!(incoming.len(), 2);
        assert!(incoming.iter().all(|link| link.path == "jan"));
        assert!(incoming
            .iter()
            .all(|link| link.parent().expect("parent") == ContentId::ROOT));

        let outgoing = Link::links_from(ContentId::ROOT, &db)
            .await
            .expect("links from root");
        assert_eq!(outgoing.len(), 2);
        assert_eq!(Link::count(&db).await.expect("count"), 2);
    }

    #[tokio::test]
    async fn count_is_zero_on_empty_graph() {
        let db = setup_db().await;
        assert_eq!(Link::count(&db).await.expect("count"), 0);
        assert!(Link::links_to(ContentId::ROOT, &db)
            .await
            .expect("query")
            .is_empty());
    }
}
