//! Users, classrooms, memberships, roles, fund accounts

use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

use super::{parse_datetime, parse_opt_datetime, Database};
use crate::error::{Error, Result};
use crate::models::*;

/// Invite code length
const CODE_LEN: usize = 6;

/// A class as listed for one user, with their role attached
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClassSummary {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub owner_id: i64,
    pub role: ClassRole,
    pub member_status: MemberStatus,
    pub members_count: i64,
}

/// A class member with the joined user fields
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemberRow {
    pub member_id: i64,
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: ClassRole,
    pub status: MemberStatus,
    pub joined_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Database {
    // ========== Users ==========

    pub fn create_user(&self, name: &str, email: &str, phone: Option<&str>) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (name, email, phone) VALUES (?, ?, ?)",
            params![name, email, phone],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, name, email, phone, created_at FROM users WHERE id = ?")?;
        let user = stmt
            .query_row(params![id], |row| Self::row_to_user(row))
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, name, email, phone, created_at FROM users WHERE email = ?")?;
        let user = stmt
            .query_row(params![email], |row| Self::row_to_user(row))
            .optional()?;
        Ok(user)
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let created_at: String = row.get(4)?;
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            created_at: parse_datetime(&created_at),
        })
    }

    // ========== Classes ==========

    /// Create a class: generates a unique invite code and makes the creator
    /// the owner member, in one transaction.
    pub fn create_class(&self, name: &str, owner_user_id: i64) -> Result<Classroom> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let code = {
            let mut attempt = 0u32;
            loop {
                let candidate = generate_code(name, owner_user_id, attempt);
                let taken: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM classes WHERE code = ?",
                    params![candidate],
                    |row| row.get(0),
                )?;
                if taken == 0 {
                    break candidate;
                }
                attempt += 1;
                if attempt > 64 {
                    return Err(Error::Conflict("could not allocate an invite code".into()));
                }
            }
        };

        tx.execute(
            "INSERT INTO classes (name, code, owner_id) VALUES (?, ?, ?)",
            params![name, code, owner_user_id],
        )?;
        let class_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO class_members (class_id, user_id, role, status, joined_at)
             VALUES (?, ?, 'owner', 'active', CURRENT_TIMESTAMP)",
            params![class_id, owner_user_id],
        )?;

        tx.commit()?;

        self.get_class(class_id)?
            .ok_or_else(|| Error::NotFound("class not found after creation".into()))
    }

    pub fn get_class(&self, id: i64) -> Result<Option<Classroom>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name, code, owner_id, created_at FROM classes WHERE id = ?")?;
        let class = stmt
            .query_row(params![id], |row| Self::row_to_class(row))
            .optional()?;
        Ok(class)
    }

    pub fn find_class_by_code(&self, code: &str) -> Result<Option<Classroom>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name, code, owner_id, created_at FROM classes WHERE code = ?")?;
        let class = stmt
            .query_row(params![code], |row| Self::row_to_class(row))
            .optional()?;
        Ok(class)
    }

    fn row_to_class(row: &rusqlite::Row) -> rusqlite::Result<Classroom> {
        let created_at: String = row.get(4)?;
        Ok(Classroom {
            id: row.get(0)?,
            name: row.get(1)?,
            code: row.get(2)?,
            owner_id: row.get(3)?,
            created_at: parse_datetime(&created_at),
        })
    }

    /// The classes a user belongs to, with their role and the member count
    pub fn my_classes(&self, user_id: i64) -> Result<Vec<ClassSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.name, c.code, c.owner_id, cm.role, cm.status,
                    (SELECT COUNT(*) FROM class_members WHERE class_id = c.id) as members_count
             FROM classes c
             JOIN class_members cm ON cm.class_id = c.id
             WHERE cm.user_id = ?
             ORDER BY c.created_at DESC",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                let role: String = row.get(4)?;
                let status: String = row.get(5)?;
                Ok(ClassSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    code: row.get(2)?,
                    owner_id: row.get(3)?,
                    role: role.parse().unwrap_or(ClassRole::Member),
                    member_status: status.parse().unwrap_or_default(),
                    members_count: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ========== Memberships & roles ==========

    /// Join a class; re-joining is a no-op returning the existing membership
    pub fn join_class(&self, class_id: i64, user_id: i64) -> Result<ClassMember> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO class_members (class_id, user_id, role, status, joined_at)
             VALUES (?, ?, 'member', 'active', CURRENT_TIMESTAMP)",
            params![class_id, user_id],
        )?;
        drop(conn);

        self.member_for_user(class_id, user_id)?
            .ok_or_else(|| Error::NotFound("membership not found after join".into()))
    }

    pub fn member_for_user(&self, class_id: i64, user_id: i64) -> Result<Option<ClassMember>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, class_id, user_id, role, status, joined_at
             FROM class_members WHERE class_id = ? AND user_id = ?",
        )?;
        let member = stmt
            .query_row(params![class_id, user_id], |row| Self::row_to_member(row))
            .optional()?;
        Ok(member)
    }

    pub fn get_member(&self, member_id: i64) -> Result<Option<ClassMember>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, class_id, user_id, role, status, joined_at
             FROM class_members WHERE id = ?",
        )?;
        let member = stmt
            .query_row(params![member_id], |row| Self::row_to_member(row))
            .optional()?;
        Ok(member)
    }

    fn row_to_member(row: &rusqlite::Row) -> rusqlite::Result<ClassMember> {
        let role: String = row.get(3)?;
        let status: String = row.get(4)?;
        let joined_at: Option<String> = row.get(5)?;
        Ok(ClassMember {
            id: row.get(0)?,
            class_id: row.get(1)?,
            user_id: row.get(2)?,
            role: role.parse().unwrap_or(ClassRole::Member),
            status: status.parse().unwrap_or_default(),
            joined_at: parse_opt_datetime(joined_at),
        })
    }

    /// The single source of truth for access control: a user's role within a
    /// class, None for non-members and members who left.
    pub fn role_in_class(&self, user_id: i64, class_id: i64) -> Result<Option<ClassRole>> {
        let conn = self.conn()?;
        let role: Option<String> = conn
            .query_row(
                "SELECT role FROM class_members
                 WHERE class_id = ? AND user_id = ? AND status = 'active'",
                params![class_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(role.and_then(|r| r.parse().ok()))
    }

    pub fn class_members(&self, class_id: i64) -> Result<Vec<MemberRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT cm.id, u.id, u.name, u.email, cm.role, cm.status, cm.joined_at
             FROM class_members cm
             JOIN users u ON u.id = cm.user_id
             WHERE cm.class_id = ?
             ORDER BY u.name",
        )?;
        let rows = stmt
            .query_map(params![class_id], |row| {
                let role: String = row.get(4)?;
                let status: String = row.get(5)?;
                let joined_at: Option<String> = row.get(6)?;
                Ok(MemberRow {
                    member_id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    email: row.get(3)?,
                    role: role.parse().unwrap_or(ClassRole::Member),
                    status: status.parse().unwrap_or_default(),
                    joined_at: parse_opt_datetime(joined_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Active member ids of a class (used for invoice generation)
    pub fn active_member_ids(&self, class_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM class_members WHERE class_id = ? AND status = 'active' ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![class_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Assign member/treasurer to a user, creating the membership if needed.
    /// The owner role is not assignable here; use `transfer_ownership`.
    pub fn set_member_role(&self, class_id: i64, user_id: i64, role: ClassRole) -> Result<ClassMember> {
        if role == ClassRole::Owner {
            return Err(Error::InvalidData(
                "ownership changes go through transfer_ownership".into(),
            ));
        }
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO class_members (class_id, user_id, role, status, joined_at)
             VALUES (?, ?, 'member', 'active', CURRENT_TIMESTAMP)",
            params![class_id, user_id],
        )?;
        conn.execute(
            "UPDATE class_members SET role = ? WHERE class_id = ? AND user_id = ?",
            params![role.as_str(), class_id, user_id],
        )?;
        drop(conn);

        self.member_for_user(class_id, user_id)?
            .ok_or_else(|| Error::NotFound("membership not found after role change".into()))
    }

    /// Hand the class to another user: the previous owner is demoted to
    /// treasurer, the new owner's membership is created if needed.
    pub fn transfer_ownership(
        &self,
        class_id: i64,
        old_owner_user_id: i64,
        new_owner_user_id: i64,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO class_members (class_id, user_id, role, status, joined_at)
             VALUES (?, ?, 'member', 'active', CURRENT_TIMESTAMP)",
            params![class_id, new_owner_user_id],
        )?;
        tx.execute(
            "UPDATE class_members SET role = 'treasurer'
             WHERE class_id = ? AND user_id = ?",
            params![class_id, old_owner_user_id],
        )?;
        tx.execute(
            "UPDATE class_members SET role = 'owner', status = 'active'
             WHERE class_id = ? AND user_id = ?",
            params![class_id, new_owner_user_id],
        )?;
        tx.execute(
            "UPDATE classes SET owner_id = ? WHERE id = ?",
            params![new_owner_user_id, class_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    // ========== Fund accounts ==========

    pub fn fund_account_for_class(&self, class_id: i64) -> Result<Option<FundAccount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, class_id, bank_code, account_number, account_name, created_at
             FROM fund_accounts WHERE class_id = ?",
        )?;
        let fund = stmt
            .query_row(params![class_id], |row| {
                let created_at: String = row.get(5)?;
                Ok(FundAccount {
                    id: row.get(0)?,
                    class_id: row.get(1)?,
                    bank_code: row.get(2)?,
                    account_number: row.get(3)?,
                    account_name: row.get(4)?,
                    created_at: parse_datetime(&created_at),
                })
            })
            .optional()?;
        Ok(fund)
    }

    /// Create or replace the class fund account
    pub fn upsert_fund_account(
        &self,
        class_id: i64,
        bank_code: &str,
        account_number: &str,
        account_name: &str,
    ) -> Result<FundAccount> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO fund_accounts (class_id, bank_code, account_number, account_name)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(class_id) DO UPDATE SET
                 bank_code = excluded.bank_code,
                 account_number = excluded.account_number,
                 account_name = excluded.account_name",
            params![
                class_id,
                bank_code.to_uppercase(),
                account_number,
                account_name.to_uppercase()
            ],
        )?;
        drop(conn);

        self.fund_account_for_class(class_id)?
            .ok_or_else(|| Error::NotFound("fund account not found after upsert".into()))
    }
}

/// Derive an invite code candidate. Hash-based so retries are cheap and the
/// charset stays unambiguous (no 0/O, 1/I).
fn generate_code(name: &str, owner_id: i64, attempt: u32) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(owner_id.to_le_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(attempt.to_le_bytes());
    let digest = hasher.finalize();

    digest
        .iter()
        .take(CODE_LEN)
        .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char)
        .collect()
}
