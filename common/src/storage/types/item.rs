use std::path::Path;

use crate::{error::AppError, stored_object, utils::codec::Encoding, utils::identity::ContentId};

/// Separator placed between source paths when a known identity is rediscovered.
pub const COMMENT_SEPARATOR: &str = " + ";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Root,
    Directory,
    File,
}

stored_object!(Item, "item", {
    name: String,
    extension: String,
    kind: ItemKind,
    #[serde(default)]
    encoding: Encoding,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
    registered_at: DateTime<Utc>,
    comments: String
});

impl Item {
    /// The sentinel ancestor of everything ingested from `source_root`.
    pub fn root(source_root: &Path) -> Self {
        let now = Utc::now();
        Self {
            id: ContentId::ROOT.to_hex(),
            created_at: now,
            updated_at: now,
            name: source_root.to_string_lossy().into_owned(),
            extension: String::new(),
            kind: ItemKind::Root,
            encoding: Encoding::Verbatim,
            registered_at: now,
            comments: String::new(),
        }
    }

    pub fn directory(
        id: ContentId,
        name: String,
        registered_at: DateTime<Utc>,
        source: &Path,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_hex(),
            created_at: now,
            updated_at: now,
            name,
            extension: String::new(),
            kind: ItemKind::Directory,
            encoding: Encoding::Verbatim,
            registered_at,
            comments: source.to_string_lossy().into_owned(),
        }
    }

    /// `extension` is the stored (possibly compound) extension of the blob.
    pub fn file(
        id: ContentId,
        name: String,
        extension: String,
        encoding: Encoding,
        registered_at: DateTime<Utc>,
        source: &Path,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_hex(),
            created_at: now,
            updated_at: now,
            name,
            extension,
            kind: ItemKind::File,
            encoding,
            registered_at,
            comments: source.to_string_lossy().into_owned(),
        }
    }

    pub fn content_id(&self) -> Result<ContentId, AppError> {
        ContentId::from_hex(&self.id)
    }

    /// Every source path recorded in the audit trail, oldest first.
    pub fn sources(&self) -> Vec<&str> {
        if self.comments.is_empty() {
            return Vec::new();
        }
        self.comments.split(COMMENT_SEPARATOR).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn root_item_uses_the_sentinel_identity() {
        let root = Item::root(&PathBuf::from("/docs"));
        assert_eq!(root.id, "0".repeat(32));
        assert_eq!(root.kind, ItemKind::Root);
        assert_eq!(root.name, "/docs");
        assert!(root.content_id().expect("hex id").is_root());
    }

    #[test]
    fn file_item_keeps_source_path_as_first_comment() {
        let id = ContentId::of_content(b"X");
        let item = Item::file(
            id,
            "Report".into(),
            ".txt.gz".into(),
            Encoding::Gzip,
            Utc::now(),
            &PathBuf::from("/docs/2021/jan/report.txt"),
        );

        assert_eq!(item.content_id().expect("hex id"), id);
        assert_eq!(item.sources(), vec!["/docs/2021/jan/report.txt"]);
        assert_eq!(item.encoding, Encoding::Gzip);
    }

    #[test]
    fn sources_split_merged_comments() {
        let mut item = Item::directory(
            ContentId::of_directory(&PathBuf::from("/docs/jan")),
            "Jan".into(),
            Utc::now(),
            &PathBuf::from("/docs/jan"),
        );
        item.comments = format!("/a/x.txt{COMMENT_SEPARATOR}/b/x.txt");
        assert_eq!(item.sources(), vec!["/a/x.txt", "/b/x.txt"]);
    }
}
