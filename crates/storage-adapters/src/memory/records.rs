use super::{timestamp, MemoryBackend};
use async_trait::async_trait;
use domains::{
    matches_all, BoardError, ChangeEvent, ChangeKind, Collection, Direction, Filter, Order, Query, Record, RecordStore,
    Result,
};
use serde_json::{json, Map, Value};
use std::sync::atomic::Ordering;
use tracing::debug;

/// Columns that must be present (and non-null) on insert.
fn required_columns(collection: Collection) -> &'static [&'static str] {
    match collection {
        Collection::Profiles => &["id"],
        Collection::Posts => &["user_id", "type", "title"],
        Collection::Comments => &["post_id", "content"],
        Collection::Notifications => &["post_id", "user_id", "content"],
    }
}

/// Column defaults applied when the insert payload leaves them out.
fn column_defaults(collection: Collection) -> Vec<(&'static str, Value)> {
    match collection {
        Collection::Profiles => vec![("nickname", Value::Null), ("avatar_url", Value::Null)],
        Collection::Posts => vec![
            ("description", Value::Null),
            ("item_category", Value::Null),
            ("location", Value::Null),
            ("lost_found_date", Value::Null),
            ("image_urls", Value::Null),
            ("status", json!("open")),
        ],
        Collection::Comments => vec![("user_id", Value::Null), ("is_anonymous", json!(false))],
        Collection::Notifications => vec![("is_read", json!(false))],
    }
}

fn object_payload(record: Record, action: &str) -> Result<Map<String, Value>> {
    match record {
        Value::Object(fields) => Ok(fields),
        other => Err(BoardError::backend(format!("{action} payload must be an object, got {other}"))),
    }
}

impl MemoryBackend {
    fn rows_matching(&self, collection: Collection, filters: &[Filter]) -> Vec<Record> {
        self.tables
            .get(&collection)
            .map(|rows| rows.iter().filter(|r| matches_all(filters, r)).cloned().collect())
            .unwrap_or_default()
    }

    fn exists(&self, collection: Collection, filter: Filter) -> bool {
        !self.rows_matching(collection, &[filter]).is_empty()
    }

    /// Adds the `profiles` author reference to post and comment rows.
    fn present(&self, collection: Collection, mut row: Record) -> Record {
        if !matches!(collection, Collection::Posts | Collection::Comments) {
            return row;
        }
        let profile = row
            .get("user_id")
            .filter(|id| !id.is_null())
            .cloned()
            .and_then(|id| self.rows_matching(Collection::Profiles, &[Filter::eq("id", id)]).pop());
        let reference = match profile {
            Some(p) => json!({ "id": p["id"], "nickname": p["nickname"], "avatar_url": p["avatar_url"] }),
            None => Value::Null,
        };
        if let Some(fields) = row.as_object_mut() {
            fields.insert("profiles".into(), reference);
        }
        row
    }

    fn check_constraints(&self, collection: Collection, fields: &Map<String, Value>) -> Result<()> {
        for column in required_columns(collection) {
            if fields.get(*column).map_or(true, Value::is_null) {
                return Err(BoardError::backend(format!(
                    "null value in column \"{column}\" of relation \"{collection}\" violates not-null constraint"
                )));
            }
        }
        match collection {
            Collection::Profiles => {
                if self.exists(Collection::Profiles, Filter::eq("id", fields["id"].clone())) {
                    return Err(BoardError::backend(
                        "duplicate key value violates unique constraint \"profiles_pkey\"",
                    ));
                }
            }
            Collection::Comments | Collection::Notifications => {
                if !self.exists(Collection::Posts, Filter::eq("id", fields["post_id"].clone())) {
                    return Err(BoardError::backend(format!(
                        "insert on table \"{collection}\" violates foreign key constraint \"{collection}_post_id_fkey\""
                    )));
                }
            }
            Collection::Posts => {}
        }
        Ok(())
    }

    /// Stores a row the way the server would: constraints, id, defaults,
    /// then the change event and any trigger it fires.
    pub(super) fn insert_row(&self, collection: Collection, record: Record) -> Result<Record> {
        let mut fields = object_payload(record, "insert")?;
        fields.remove("profiles");
        self.check_constraints(collection, &fields)?;

        if collection != Collection::Profiles {
            let id = self.next_row_id.fetch_add(1, Ordering::SeqCst);
            fields.insert("id".into(), json!(id));
        }
        for (column, value) in column_defaults(collection) {
            fields.entry(column).or_insert(value);
        }
        fields.entry("created_at").or_insert_with(|| json!(timestamp()));

        let row = Value::Object(fields);
        self.tables.entry(collection).or_default().push(row.clone());
        debug!(%collection, id = %row["id"], "row inserted");

        self.emit(ChangeEvent {
            collection,
            kind: ChangeKind::Insert,
            new: Some(row.clone()),
            old: None,
        });
        if collection == Collection::Comments {
            self.notify_post_owner(&row)?;
        }
        Ok(self.present(collection, row))
    }

    /// Comment trigger: tells the post owner someone else replied.
    fn notify_post_owner(&self, comment: &Record) -> Result<()> {
        let Some(post) = self
            .rows_matching(Collection::Posts, &[Filter::eq("id", comment["post_id"].clone())])
            .pop()
        else {
            return Ok(());
        };
        if post["user_id"] == comment["user_id"] {
            return Ok(());
        }
        let title = post["title"].as_str().unwrap_or_default();
        self.insert_row(
            Collection::Notifications,
            json!({
                "post_id": post["id"],
                "user_id": post["user_id"],
                "content": format!("有人评论了你的帖子「{title}」"),
            }),
        )?;
        Ok(())
    }

    fn select(&self, query: &Query) -> Vec<Record> {
        let mut rows = self.rows_matching(query.collection, &query.filters);
        if let Some(order) = &query.order {
            // Rows created within the same microsecond keep id order.
            let by_id = match order.direction {
                Direction::Ascending => Order::asc("id"),
                Direction::Descending => Order::desc("id"),
            };
            rows.sort_by(|a, b| order.compare(a, b).then_with(|| by_id.compare(a, b)));
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        rows.into_iter().map(|row| self.present(query.collection, row)).collect()
    }

    fn update_rows(&self, collection: Collection, filters: &[Filter], patch: &Map<String, Value>) -> Vec<(Record, Record)> {
        let mut changed = Vec::new();
        if let Some(mut rows) = self.tables.get_mut(&collection) {
            for row in rows.iter_mut() {
                if !matches_all(filters, row) {
                    continue;
                }
                let old = row.clone();
                if let Some(fields) = row.as_object_mut() {
                    for (column, value) in patch {
                        if column != "id" && column != "profiles" {
                            fields.insert(column.clone(), value.clone());
                        }
                    }
                }
                changed.push((old, row.clone()));
            }
        }
        changed
    }

    fn remove_rows(&self, collection: Collection, filters: &[Filter]) -> Vec<Record> {
        let Some(mut rows) = self.tables.get_mut(&collection) else {
            return Vec::new();
        };
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *rows)
            .into_iter()
            .partition(|row| matches_all(filters, row));
        *rows = kept;
        removed
    }

    fn emit_deletes(&self, collection: Collection, rows: &[Record]) {
        for row in rows {
            self.emit(ChangeEvent {
                collection,
                kind: ChangeKind::Delete,
                new: None,
                old: Some(row.clone()),
            });
        }
    }
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn query(&self, query: Query) -> Result<Vec<Record>> {
        Ok(self.select(&query))
    }

    async fn query_one(&self, collection: Collection, filters: Vec<Filter>) -> Result<Option<Record>> {
        let row = self.rows_matching(collection, &filters).into_iter().next();
        Ok(row.map(|row| self.present(collection, row)))
    }

    async fn insert(&self, collection: Collection, record: Record) -> Result<Record> {
        self.insert_row(collection, record)
    }

    async fn update(&self, collection: Collection, filters: Vec<Filter>, patch: Record) -> Result<Vec<Record>> {
        let patch = object_payload(patch, "update")?;
        let changed = self.update_rows(collection, &filters, &patch);
        debug!(%collection, rows = changed.len(), "rows updated");

        let mut updated = Vec::with_capacity(changed.len());
        for (old, new) in changed {
            self.emit(ChangeEvent {
                collection,
                kind: ChangeKind::Update,
                new: Some(new.clone()),
                old: Some(old),
            });
            updated.push(self.present(collection, new));
        }
        Ok(updated)
    }

    async fn delete(&self, collection: Collection, filters: Vec<Filter>) -> Result<()> {
        let removed = self.remove_rows(collection, &filters);
        debug!(%collection, rows = removed.len(), "rows deleted");
        self.emit_deletes(collection, &removed);

        if collection == Collection::Posts {
            for post in &removed {
                let children = [Filter::eq("post_id", post["id"].clone())];
                for child in [Collection::Comments, Collection::Notifications] {
                    let gone = self.remove_rows(child, &children);
                    self.emit_deletes(child, &gone);
                }
            }
        }
        Ok(())
    }
}
