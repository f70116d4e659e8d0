use bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneOptions, ReplaceOptions, UpdateOptions};
use mongodb::{Collection, Database};
use serde_json::Value;

use super::{tree, ChangeFeed, DocumentStore, Path, StoreError, WriteBatch};
use crate::data::PROFESSORS;
use crate::keys::Key;

pub static PROFESSOR_COLLECTION_NAME: &str = "professors";

const DUPLICATE_KEY: i32 = 11000;

/// Stores each professor's subtree as one document, so every batch inside a
/// professor applies as a single atomic update.
#[derive(Debug, Clone)]
pub struct MongoStore {
    collection: Collection<Document>,
    feed: ChangeFeed,
}

impl MongoStore {
    pub fn new(db: &Database, feed_capacity: usize) -> MongoStore {
        MongoStore {
            collection: db.collection(PROFESSOR_COLLECTION_NAME),
            feed: ChangeFeed::new(feed_capacity),
        }
    }
}

/// Splits `professors/{id}/rest..` into the document id and the path inside it.
fn locate(path: &Path) -> Result<(&Key, &[Key]), StoreError> {
    match path.segments() {
        [root, owner, rest @ ..] if root.as_str() == PROFESSORS => Ok((owner, rest)),
        _ => Err(StoreError::Unscoped(path.clone())),
    }
}

fn dotted(segments: &[Key]) -> String {
    segments
        .iter()
        .map(Key::as_str)
        .collect::<Vec<_>>()
        .join(".")
}

fn by_owner(owner: &Key) -> Document {
    doc! { "_id": owner.as_str() }
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(err)) => err.code == DUPLICATE_KEY,
        ErrorKind::Command(err) => err.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// One batch translated into the single operation that applies it.
#[derive(Debug, Clone, PartialEq)]
enum Encoded {
    Delete,
    Replace(Document),
    Update { update: Document, upsert: bool },
}

/// Translates a validated batch into one operation on the owner's document.
/// `None` when the batch is empty.
fn encode_batch(batch: WriteBatch) -> Result<Option<(Key, Encoded)>, StoreError> {
    let mut owner: Option<Key> = None;
    let mut set = Document::new();
    let mut unset = Document::new();
    let mut replace: Option<Value> = None;

    for (path, value) in batch.into_writes() {
        let (doc_owner, rest) = locate(&path)?;
        match &owner {
            Some(it) if it != doc_owner => return Err(StoreError::CrossDocument),
            Some(_) => {}
            None => owner = Some(doc_owner.clone()),
        }

        let value = tree::normalize(value);
        if rest.is_empty() {
            // Validation guarantees this is the only write of the batch.
            replace = Some(value);
        } else if value.is_null() {
            unset.insert(dotted(rest), "");
        } else {
            set.insert(dotted(rest), bson::to_bson(&value)?);
        }
    }

    let owner = match owner {
        Some(it) => it,
        None => return Ok(None),
    };

    let encoded = match replace {
        Some(Value::Null) => Encoded::Delete,
        Some(value) => {
            let mut document = bson::to_document(&value)?;
            document.insert("_id", owner.as_str());
            Encoded::Replace(document)
        }
        None => {
            // Removals alone never create the document.
            let upsert = !set.is_empty();
            let mut update = Document::new();
            if !set.is_empty() {
                update.insert("$set", set);
            }
            if !unset.is_empty() {
                update.insert("$unset", unset);
            }
            Encoded::Update { update, upsert }
        }
    };
    Ok(Some((owner, encoded)))
}

/// Filter and update of a create-if-absent below the document root. The
/// filter only matches while the field is missing; otherwise the upsert
/// collides with the existing document id.
fn encode_create(owner: &Key, rest: &[Key], value: Bson) -> (Document, Document) {
    let field = dotted(rest);
    let mut filter = by_owner(owner);
    filter.insert(field.clone(), doc! { "$exists": false });
    let mut set = Document::new();
    set.insert(field, value);
    (filter, doc! { "$set": set })
}

impl DocumentStore for MongoStore {
    async fn get(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        let (owner, rest) = locate(path)?;

        let options = if rest.is_empty() {
            None
        } else {
            let mut projection = doc! { "_id": 0 };
            projection.insert(dotted(rest), 1);
            Some(FindOneOptions::builder().projection(projection).build())
        };

        let document = match self.collection.find_one(by_owner(owner), options).await? {
            Some(mut document) => {
                document.remove("_id");
                document
            }
            None => return Ok(None),
        };

        let node = tree::normalize(Bson::Document(document).into_relaxed_extjson());
        Ok(tree::lookup(&node, rest).cloned())
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        batch.validate()?;
        let paths = batch.paths();
        let (owner, encoded) = match encode_batch(batch)? {
            Some(it) => it,
            None => return Ok(()),
        };

        match encoded {
            Encoded::Delete => {
                self.collection.delete_one(by_owner(&owner), None).await?;
            }
            Encoded::Replace(document) => {
                self.collection
                    .replace_one(
                        by_owner(&owner),
                        document,
                        ReplaceOptions::builder().upsert(true).build(),
                    )
                    .await?;
            }
            Encoded::Update { update, upsert } => {
                self.collection
                    .update_one(
                        by_owner(&owner),
                        update,
                        UpdateOptions::builder().upsert(upsert).build(),
                    )
                    .await?;
            }
        }

        tracing::debug!("applied {} writes to professor {}", paths.len(), owner);
        self.feed.publish(paths);
        Ok(())
    }

    async fn create(&self, path: &Path, value: Value) -> Result<bool, StoreError> {
        let (owner, rest) = locate(path)?;
        let value = bson::to_bson(&tree::normalize(value))?;

        let result = if rest.is_empty() {
            let mut document = match value {
                Bson::Document(document) => document,
                _ => Document::new(),
            };
            document.insert("_id", owner.as_str());
            self.collection.insert_one(document, None).await.map(|_| ())
        } else {
            let (filter, update) = encode_create(owner, rest, value);
            self.collection
                .update_one(
                    filter,
                    update,
                    UpdateOptions::builder().upsert(true).build(),
                )
                .await
                .map(|_| ())
        };

        match result {
            Ok(()) => {
                self.feed.publish(vec![path.clone()]);
                Ok(true)
            }
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn locate_splits_professor_document() {
        let path = Path::parse("professors/p1/classes/c1/students/s1").unwrap();
        let (owner, rest) = locate(&path).unwrap();
        assert_eq!(owner.as_str(), "p1");
        assert_eq!(dotted(rest), "classes.c1.students.s1");

        assert!(matches!(
            locate(&Path::parse("professors").unwrap()),
            Err(StoreError::Unscoped(_))
        ));
        assert!(matches!(
            locate(&Path::parse("teachers/p1").unwrap()),
            Err(StoreError::Unscoped(_))
        ));
    }

    fn path(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    fn encoded(batch: WriteBatch) -> Encoded {
        encode_batch(batch).unwrap().unwrap().1
    }

    #[test]
    fn sets_and_removals_share_one_update() {
        let mut batch = WriteBatch::new();
        batch
            .set(path("professors/p1/classes/c1/className"), json!("Math"))
            .remove(path("professors/p1/classes/c1/students/s1/scores/a1"));

        let (owner, encoded) = encode_batch(batch).unwrap().unwrap();
        assert_eq!(owner.as_str(), "p1");
        assert_eq!(
            encoded,
            Encoded::Update {
                update: doc! {
                    "$set": { "classes.c1.className": "Math" },
                    "$unset": { "classes.c1.students.s1.scores.a1": "" },
                },
                upsert: true,
            }
        );
    }

    #[test]
    fn removals_only_never_upsert() {
        let mut batch = WriteBatch::new();
        batch
            .remove(path("professors/p1/classes/c1/activities/a1"))
            .remove(path("professors/p1/classes/c1/students/s1/scores/a1"));

        match encoded(batch) {
            Encoded::Update { update, upsert } => {
                assert!(!upsert);
                assert!(update.get("$set").is_none());
                assert_eq!(update.get_document("$unset").unwrap().len(), 2);
            }
            other => panic!("unexpected encoding {:?}", other),
        }
    }

    #[test]
    fn root_writes_replace_or_delete() {
        let batch = WriteBatch::single(path("professors/p1"), json!({"classes": {}}));
        match encoded(batch) {
            Encoded::Replace(document) => {
                assert_eq!(document.get_str("_id").unwrap(), "p1");
            }
            other => panic!("unexpected encoding {:?}", other),
        }

        let batch = WriteBatch::single(path("professors/p1"), Value::Null);
        assert_eq!(encoded(batch), Encoded::Delete);
    }

    #[test]
    fn batches_stay_inside_one_professor() {
        let mut batch = WriteBatch::new();
        batch
            .set(path("professors/p1/classes/c1/section"), json!("A"))
            .set(path("professors/p2/classes/c1/section"), json!("B"));
        assert!(matches!(
            encode_batch(batch),
            Err(StoreError::CrossDocument)
        ));
        assert!(encode_batch(WriteBatch::new()).unwrap().is_none());
    }

    #[test]
    fn create_matches_only_missing_field() {
        let owner = Key::new("p1").unwrap();
        let target = path("professors/p1/classes/c1/students/S1");
        let (_, rest) = locate(&target).unwrap();

        let (filter, update) = encode_create(&owner, rest, Bson::from("Ann"));
        assert_eq!(
            filter,
            doc! { "_id": "p1", "classes.c1.students.S1": { "$exists": false } }
        );
        assert_eq!(update, doc! { "$set": { "classes.c1.students.S1": "Ann" } });
    }
}
