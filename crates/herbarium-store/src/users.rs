use chrono::{DateTime, Utc};
use herbarium_shared::{Role, UserId};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::{parse_ts, ts, Database};
use crate::error::{map_write_error, Result, StoreError};
use crate::models::User;

const USER_COLUMNS: &str = "id, name, email, password_hash, role, institution, is_active,
     last_login, created_at, updated_at";

impl Database {
    /// Insert a user. The email must already be lower-cased; a taken email
    /// yields [`StoreError::DuplicateKey`].
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, name, email, password_hash, role, institution,
                    is_active, last_login, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    user.id.to_string(),
                    user.name,
                    user.email,
                    user.password_hash,
                    user.role.as_str(),
                    user.institution,
                    user.is_active,
                    user.last_login.as_ref().map(ts),
                    ts(&user.created_at),
                    ts(&user.updated_at),
                ],
            )
            .map_err(map_write_error)?;

        tracing::debug!(user_id = %user.id.short(), role = %user.role, "user created");
        Ok(())
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email.trim().to_lowercase()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET last_login = ?2, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), ts(&at)],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn set_user_active(&self, id: UserId, active: bool) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), active, ts(&Utc::now())],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

#[derive(Debug)]
struct UnknownRole(String);

impl std::fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UnknownRole {}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let role_str: String = row.get(4)?;
    let last_login: Option<String> = row.get(7)?;
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?;
    let role: Role = role_str
        .parse()
        .map_err(|e: String| conversion_error(4, UnknownRole(e)))?;

    Ok(User {
        id: UserId(id),
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role,
        institution: row.get(5)?,
        is_active: row.get(6)?,
        last_login: last_login.as_deref().map(|raw| parse_ts(7, raw)).transpose()?,
        created_at: parse_ts(8, &created_str)?,
        updated_at: parse_ts(9, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str, role: Role) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(),
            name: "Ana Quizhpe".into(),
            email: email.into(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
            role,
            institution: "Universidad Técnica Particular de Loja".into(),
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_create_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let ana = user("ana@utpl.edu.ec", Role::Curator);
        db.create_user(&ana).unwrap();

        let fetched = db.get_user(ana.id).unwrap();
        assert_eq!(fetched.email, "ana@utpl.edu.ec");
        assert_eq!(fetched.role, Role::Curator);
        assert!(fetched.is_active);

        let by_email = db.find_user_by_email("  ANA@utpl.edu.ec ").unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(ana.id));
        assert!(db.find_user_by_email("nobody@utpl.edu.ec").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("dup@utpl.edu.ec", Role::Viewer)).unwrap();

        match db.create_user(&user("dup@utpl.edu.ec", Role::Admin)) {
            Err(StoreError::DuplicateKey(column)) => assert_eq!(column, "email"),
            other => panic!("expected DuplicateKey, got {other:?}"),
        }
    }

    #[test]
    fn test_login_and_deactivate() {
        let db = Database::open_in_memory().unwrap();
        let ana = user("ana@utpl.edu.ec", Role::Cataloger);
        db.create_user(&ana).unwrap();

        db.record_login(ana.id, Utc::now()).unwrap();
        assert!(db.get_user(ana.id).unwrap().last_login.is_some());

        db.set_user_active(ana.id, false).unwrap();
        assert!(!db.get_user(ana.id).unwrap().is_active);

        assert!(matches!(
            db.record_login(UserId::new(), Utc::now()),
            Err(StoreError::NotFound)
        ));
        assert_eq!(db.list_users().unwrap().len(), 1);
    }
}
