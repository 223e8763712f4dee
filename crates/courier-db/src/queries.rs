use crate::Database;
use crate::models::{ChatSummaryRow, GroupRow, MessageRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        phone: &str,
        name: &str,
        password_hash: &str,
        is_admin: bool,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (phone, name, password, is_admin) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![phone, name, password_hash, is_admin],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Insert the default administrator account if no user with phone
    /// `admin` exists yet. Returns true if the row was created.
    pub fn seed_admin(&self, password_hash: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE phone = 'admin')",
                [],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO users (phone, name, password, is_admin)
                 VALUES ('admin', 'Administrator', ?1, 1)",
                [password_hash],
            )?;
            Ok(true)
        })
    }

    pub fn get_user_by_phone(&self, phone: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "SELECT id, phone, name, password, is_admin, created_at FROM users WHERE phone = ?1", phone)
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "SELECT id, phone, name, password, is_admin, created_at FROM users WHERE id = ?1", id)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, phone, name, password, is_admin, created_at FROM users ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All users except the caller, for the contact list.
    pub fn list_contacts(&self, excluding: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, phone, name, password, is_admin, created_at
                 FROM users WHERE id != ?1 ORDER BY name",
            )?;
            let rows = stmt
                .query_map([excluding], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn search_contacts(&self, query: &str) -> Result<Vec<UserRow>> {
        let pattern = format!("%{}%", query);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, phone, name, password, is_admin, created_at
                 FROM users WHERE name LIKE ?1 OR phone LIKE ?1 ORDER BY name",
            )?;
            let rows = stmt
                .query_map([&pattern], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Physical delete. Memberships, read cursors and authored messages go
    /// with the user via FK cascade.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn set_admin(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("UPDATE users SET is_admin = 1 WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    // -- Groups --

    /// Create a group and its membership rows (creator included) in a single
    /// transaction. Any failure — an unknown member id trips the FK check —
    /// rolls the whole thing back, so no orphaned group can remain.
    pub fn create_group_with_members(
        &self,
        name: &str,
        icon: Option<&str>,
        created_by: i64,
        member_ids: &[i64],
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO groups (name, icon, created_by) VALUES (?1, ?2, ?3)",
                rusqlite::params![name, icon, created_by],
            )?;
            let group_id = tx.last_insert_rowid();

            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                )?;
                for &user_id in member_ids.iter().chain(std::iter::once(&created_by)) {
                    stmt.execute([group_id, user_id])?;
                }
            }

            tx.commit()?;
            Ok(group_id)
        })
    }

    pub fn list_groups_with_counts(&self) -> Result<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.name, g.icon, g.created_by, g.created_at, COUNT(gm.user_id)
                 FROM groups g
                 LEFT JOIN group_members gm ON g.id = gm.group_id
                 GROUP BY g.id
                 ORDER BY g.id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(GroupRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        icon: row.get(2)?,
                        created_by: row.get(3)?,
                        created_at: row.get(4)?,
                        member_count: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Physical delete. Memberships, messages and read cursors cascade.
    pub fn delete_group(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM groups WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn group_exists(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM groups WHERE id = ?1)",
                [id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn is_member(&self, chat_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2)",
                [chat_id, user_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Current membership of a chat, looked up at fan-out time.
    pub fn member_ids(&self, chat_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM group_members WHERE group_id = ?1")?;
            let ids = stmt
                .query_map([chat_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    // -- Chats --

    /// The caller's chat list: every group they belong to, with a last
    /// message preview and an unread count against their read cursor.
    pub fn chats_for_user(&self, user_id: i64) -> Result<Vec<ChatSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.name, g.icon,
                        (SELECT m.content FROM messages m
                          WHERE m.chat_id = g.id ORDER BY m.id DESC LIMIT 1),
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.chat_id = g.id AND m.id > COALESCE(
                            (SELECT cr.last_read_message_id FROM chat_reads cr
                              WHERE cr.chat_id = g.id AND cr.user_id = ?1), 0)),
                        (SELECT m.id FROM messages m
                          WHERE m.chat_id = g.id ORDER BY m.id DESC LIMIT 1) AS last_id
                 FROM groups g
                 JOIN group_members gm ON g.id = gm.group_id
                 WHERE gm.user_id = ?1
                 ORDER BY last_id IS NULL, last_id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ChatSummaryRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        icon: row.get(2)?,
                        last_message: row.get(3)?,
                        unread_count: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn mark_read(&self, chat_id: i64, user_id: i64, message_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO chat_reads (chat_id, user_id, last_read_message_id)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(chat_id, user_id)
                 DO UPDATE SET last_read_message_id = excluded.last_read_message_id",
                [chat_id, user_id, message_id],
            )?;
            Ok(())
        })
    }

    // -- Messages --

    /// Insert a message and return the stored row. The rowid and timestamp
    /// are read back under the same connection lock as the insert, before
    /// any fan-out step can run.
    pub fn insert_message(
        &self,
        chat_id: i64,
        sender_id: i64,
        kind: &str,
        content: &str,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (chat_id, sender_id, kind, content) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![chat_id, sender_id, kind, content],
            )?;
            let id = conn.last_insert_rowid();

            let row = conn.query_row(
                "SELECT m.id, m.chat_id, m.sender_id, u.name, u.phone, m.kind, m.content, m.created_at
                 FROM messages m
                 JOIN users u ON m.sender_id = u.id
                 WHERE m.id = ?1",
                [id],
                map_message_row,
            )?;
            Ok(row)
        })
    }

    pub fn messages_for_chat(&self, chat_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.chat_id, m.sender_id, u.name, u.phone, m.kind, m.content, m.created_at
                 FROM messages m
                 JOIN users u ON m.sender_id = u.id
                 WHERE m.chat_id = ?1
                 ORDER BY m.created_at ASC, m.id ASC",
            )?;
            let rows = stmt
                .query_map([chat_id], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Settings --

    pub fn all_settings(&self) -> Result<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Last write wins.
    pub fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                [key, value],
            )?;
            Ok(())
        })
    }
}

fn query_user<P: rusqlite::ToSql>(
    conn: &Connection,
    sql: &str,
    param: P,
) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(sql)?;
    let row = stmt.query_row([param], map_user_row).optional()?;
    Ok(row)
}

fn map_user_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        phone: row.get(1)?,
        name: row.get(2)?,
        password: row.get(3)?,
        is_admin: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_message_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        sender_phone: row.get(4)?,
        kind: row.get(5)?,
        content: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
