//! Notes, links, and attachments: polymorphic child records.
//!
//! Each child hangs off a thin join row (created lazily on first child
//! creation, never soft-deleted) mapping it to one concrete parent.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::{Map, Value};

use crate::audit::{self, VersionEvent};
use crate::clock::now_us;
use crate::error::{CoreError, CoreResult};
use crate::model::{
    Attachment, AttachmentId, ChildKind, Link, LinkId, Note, NoteId, ParentRef, UserId,
};

/// Find or create the join row binding `parent` for the given child kind.
///
/// # Errors
///
/// Returns an error if the statements fail.
pub fn ensure_join_row(conn: &Connection, kind: ChildKind, parent: ParentRef) -> CoreResult<i64> {
    conn.execute(
        &format!(
            "INSERT OR IGNORE INTO {join} (parent_type, parent_id) VALUES (?1, ?2)",
            join = kind.join_table(),
        ),
        params![parent.tag(), parent.id()],
    )?;
    let id: i64 = conn.query_row(
        &format!(
            "SELECT id FROM {join} WHERE parent_type = ?1 AND parent_id = ?2",
            join = kind.join_table(),
        ),
        params![parent.tag(), parent.id()],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Resolve the parent of a child record by following its join row.
///
/// Returns `None` when the child does not exist or its join row points at
/// a tag outside the closed set (corrupt data).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn parent_of(conn: &Connection, kind: ChildKind, child_id: i64) -> CoreResult<Option<ParentRef>> {
    let row: Option<(String, i64)> = conn
        .query_row(
            &format!(
                "SELECT j.parent_type, j.parent_id
                 FROM {child} c
                 JOIN {join} j ON j.id = c.{fk}
                 WHERE c.id = ?1",
                child = kind.child_table(),
                join = kind.join_table(),
                fk = kind.join_fk(),
            ),
            params![child_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row.and_then(|(tag, id)| ParentRef::from_stored(&tag, id).ok()))
}

/// Create a note on a parent, recording its audit version.
///
/// # Errors
///
/// Returns an error if the statements fail.
pub fn create_note(
    conn: &mut Connection,
    parent: ParentRef,
    body: &str,
    actor: Option<UserId>,
) -> CoreResult<Note> {
    let now = now_us();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let join_id = ensure_join_row(&tx, ChildKind::Note, parent)?;
    tx.execute(
        "INSERT INTO notes (notable_id, body, created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?3)",
        params![join_id, body, now],
    )?;
    let id = NoteId(tx.last_insert_rowid());

    let mut fields = Map::new();
    fields.insert("body".to_string(), Value::String(body.to_string()));
    let changes = audit::diff_objects(&Map::new(), &fields);
    audit::record(&tx, "Note", id.0, VersionEvent::Create, Some(&changes), actor, now)?;

    tx.commit()?;
    Ok(Note {
        id,
        parent,
        body: body.to_string(),
        deleted_at_us: None,
        created_at_us: now,
        updated_at_us: now,
    })
}

/// Create a link on a parent, recording its audit version.
///
/// # Errors
///
/// Returns an error if the statements fail.
pub fn create_link(
    conn: &mut Connection,
    parent: ParentRef,
    url: &str,
    title: Option<&str>,
    actor: Option<UserId>,
) -> CoreResult<Link> {
    let now = now_us();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let join_id = ensure_join_row(&tx, ChildKind::Link, parent)?;
    tx.execute(
        "INSERT INTO links (linkable_id, url, title, created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![join_id, url, title, now],
    )?;
    let id = LinkId(tx.last_insert_rowid());

    let mut fields = Map::new();
    fields.insert("url".to_string(), Value::String(url.to_string()));
    if let Some(title) = title {
        fields.insert("title".to_string(), Value::String(title.to_string()));
    }
    let changes = audit::diff_objects(&Map::new(), &fields);
    audit::record(&tx, "Link", id.0, VersionEvent::Create, Some(&changes), actor, now)?;

    tx.commit()?;
    Ok(Link {
        id,
        parent,
        url: url.to_string(),
        title: title.map(ToString::to_string),
        deleted_at_us: None,
        created_at_us: now,
        updated_at_us: now,
    })
}

/// Create an attachment record on a parent, recording its audit version.
///
/// # Errors
///
/// Returns an error if the statements fail.
pub fn create_attachment(
    conn: &mut Connection,
    parent: ParentRef,
    filename: &str,
    content_type: Option<&str>,
    byte_size: Option<i64>,
    actor: Option<UserId>,
) -> CoreResult<Attachment> {
    let now = now_us();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let join_id = ensure_join_row(&tx, ChildKind::Attachment, parent)?;
    tx.execute(
        "INSERT INTO attachments (attachable_id, filename, content_type, byte_size,
                                  created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![join_id, filename, content_type, byte_size, now],
    )?;
    let id = AttachmentId(tx.last_insert_rowid());

    let mut fields = Map::new();
    fields.insert("filename".to_string(), Value::String(filename.to_string()));
    let changes = audit::diff_objects(&Map::new(), &fields);
    audit::record(
        &tx,
        "Attachment",
        id.0,
        VersionEvent::Create,
        Some(&changes),
        actor,
        now,
    )?;

    tx.commit()?;
    Ok(Attachment {
        id,
        parent,
        filename: filename.to_string(),
        content_type: content_type.map(ToString::to_string),
        byte_size,
        deleted_at_us: None,
        created_at_us: now,
        updated_at_us: now,
    })
}

/// List a parent's notes, active only.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_notes(conn: &Connection, parent: ParentRef) -> CoreResult<Vec<Note>> {
    let mut stmt = conn.prepare(
        "SELECT n.id, n.body, n.deleted_at_us, n.created_at_us, n.updated_at_us
         FROM notes n
         JOIN notables j ON j.id = n.notable_id
         WHERE j.parent_type = ?1 AND j.parent_id = ?2 AND n.deleted_at_us IS NULL
         ORDER BY n.created_at_us ASC",
    )?;
    let rows = stmt
        .query_map(params![parent.tag(), parent.id()], |row| {
            Ok(Note {
                id: NoteId(row.get(0)?),
                parent,
                body: row.get(1)?,
                deleted_at_us: row.get(2)?,
                created_at_us: row.get(3)?,
                updated_at_us: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Soft-delete a note, recording a destroy version.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn destroy_note(conn: &mut Connection, id: NoteId, actor: Option<UserId>) -> CoreResult<()> {
    let now = now_us();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let exists: Option<i64> = tx
        .query_row("SELECT id FROM notes WHERE id = ?1", params![id.0], |row| {
            row.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(CoreError::NotFound {
            kind: "Note",
            id: id.0,
        });
    }

    tx.execute(
        "UPDATE notes SET deleted_at_us = ?1, updated_at_us = ?1 WHERE id = ?2",
        params![now, id.0],
    )?;
    audit::record(&tx, "Note", id.0, VersionEvent::Destroy, None, actor, now)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{create_link, create_note, destroy_note, ensure_join_row, list_notes, parent_of};
    use crate::db;
    use crate::model::{ChildKind, ParentRef, TaskId, UserId};

    fn conn_with_task() -> rusqlite::Connection {
        let conn = db::open_in_memory().expect("open db");
        conn.execute(
            "INSERT INTO tasks (id, name, created_at_us, updated_at_us)
             VALUES (1, 'host the retro', 0, 0)",
            [],
        )
        .expect("task");
        conn
    }

    #[test]
    fn join_row_is_created_lazily_and_reused() {
        let conn = conn_with_task();
        let parent = ParentRef::Task(TaskId(1));
        let first = ensure_join_row(&conn, ChildKind::Note, parent).expect("first");
        let second = ensure_join_row(&conn, ChildKind::Note, parent).expect("second");
        assert_eq!(first, second);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM notables", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn notes_resolve_back_to_their_parent() {
        let mut conn = conn_with_task();
        let parent = ParentRef::Task(TaskId(1));
        let note = create_note(&mut conn, parent, "remember the follow-up", Some(UserId(2)))
            .expect("note");

        assert_eq!(
            parent_of(&conn, ChildKind::Note, note.id.0).expect("resolve"),
            Some(parent)
        );
        assert_eq!(list_notes(&conn, parent).expect("list").len(), 1);

        destroy_note(&mut conn, note.id, Some(UserId(2))).expect("destroy");
        assert!(list_notes(&conn, parent).expect("list").is_empty());
    }

    #[test]
    fn links_and_notes_use_separate_join_tables() {
        let mut conn = conn_with_task();
        let parent = ParentRef::Task(TaskId(1));
        create_note(&mut conn, parent, "a note", None).expect("note");
        create_link(&mut conn, parent, "https://example.com", Some("docs"), None).expect("link");

        let notables: i64 = conn
            .query_row("SELECT COUNT(*) FROM notables", [], |row| row.get(0))
            .expect("notables");
        let linkables: i64 = conn
            .query_row("SELECT COUNT(*) FROM linkables", [], |row| row.get(0))
            .expect("linkables");
        assert_eq!((notables, linkables), (1, 1));
    }
}
