//! Persisted notification sink.
//!
//! Delivery is fire-and-forget: callers on hot paths (the proof pipeline)
//! log and swallow failures instead of propagating them.

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::Notification;

impl Database {
    /// Fan a notification out to a set of users
    pub fn notify_users(
        &self,
        user_ids: &[i64],
        class_id: i64,
        kind: &str,
        title: &str,
        body: &str,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for user_id in user_ids {
            tx.execute(
                "INSERT INTO notifications (user_id, class_id, kind, title, body)
                 VALUES (?, ?, ?, ?, ?)",
                params![user_id, class_id, kind, title, body],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Notify every owner and treasurer of a class. Returns how many users
    /// were targeted.
    pub fn notify_treasurers(
        &self,
        class_id: i64,
        kind: &str,
        title: &str,
        body: &str,
    ) -> Result<usize> {
        let targets: Vec<i64> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT user_id FROM class_members
                 WHERE class_id = ? AND role IN ('owner', 'treasurer') AND status = 'active'",
            )?;
            let rows = stmt
                .query_map(params![class_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        self.notify_users(&targets, class_id, kind, title, body)?;
        Ok(targets.len())
    }

    pub fn list_notifications(&self, user_id: i64, unread_only: bool) -> Result<Vec<Notification>> {
        let conn = self.conn()?;
        let mut sql = String::from(
            "SELECT id, user_id, class_id, kind, title, body, is_read, sent_at
             FROM notifications WHERE user_id = ?",
        );
        if unread_only {
            sql.push_str(" AND is_read = 0");
        }
        sql.push_str(" ORDER BY sent_at DESC, id DESC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                let sent_at: String = row.get(7)?;
                Ok(Notification {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    class_id: row.get(2)?,
                    kind: row.get(3)?,
                    title: row.get(4)?,
                    body: row.get(5)?,
                    is_read: row.get(6)?,
                    sent_at: parse_datetime(&sent_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Mark one of the user's notifications read; unknown ids are a no-op
    pub fn mark_notification_read(&self, notification_id: i64, user_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?",
            params![notification_id, user_id],
        )?;
        Ok(())
    }
}
