use crate::models::{
    AppendOutcome, EXTERNAL_PASSWORD, MessageRow, NewUser, RegisterOutcome, UserRow,
    VerifyOutcome,
};
use crate::{Database, parse_timestamp, timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::info;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, password, verify_code, verify_code_expiry, \
                            is_verified, is_accepting_messages, created_at";

const MESSAGE_COLUMNS: &str = "id, user_id, content, reply, created_at";

const MAX_USERNAME_LEN: usize = 20;
/// Leaves room for `_` plus four id characters.
const EXTERNAL_BASE_LEN: usize = MAX_USERNAME_LEN - 5;

impl Database {
    // -- Users --

    /// Sign-up. A username is held by a verified account or by a pending one
    /// whose code has not expired. A pending holder under a different email
    /// blocks the name until its code expires, after which its row is
    /// removed. An unverified account with the same email is refreshed in
    /// place.
    pub fn register_user(&self, new: &NewUser<'_>, now: DateTime<Utc>) -> Result<RegisterOutcome> {
        self.with_tx(|conn| {
            if let Some(holder) = query_user_by(conn, "username", new.username)? {
                if holder.is_verified {
                    return Ok(RegisterOutcome::UsernameTaken);
                }
                if holder.email != new.email {
                    if holds_username(&holder, now)? {
                        return Ok(RegisterOutcome::UsernameTaken);
                    }
                    conn.execute("DELETE FROM users WHERE id = ?1", [&holder.id])?;
                    info!("Reclaimed username {} from expired sign-up", holder.username);
                }
            }

            let expiry = timestamp(new.verify_code_expiry);
            match query_user_by(conn, "email", new.email)? {
                Some(existing) if existing.is_verified => Ok(RegisterOutcome::EmailTaken),
                Some(existing) => {
                    conn.execute(
                        "UPDATE users
                         SET username = ?2, password = ?3, verify_code = ?4, verify_code_expiry = ?5
                         WHERE id = ?1",
                        (
                            &existing.id,
                            new.username,
                            new.password_hash,
                            new.verify_code,
                            &expiry,
                        ),
                    )?;
                    Ok(RegisterOutcome::Refreshed)
                }
                None => {
                    conn.execute(
                        "INSERT INTO users
                             (id, username, email, password, verify_code, verify_code_expiry)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        (
                            new.id,
                            new.username,
                            new.email,
                            new.password_hash,
                            new.verify_code,
                            &expiry,
                        ),
                    )?;
                    Ok(RegisterOutcome::Created)
                }
            }
        })
    }

    /// Check a sign-up code. Expiry is reported before a mismatch.
    pub fn verify_user(
        &self,
        username: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifyOutcome> {
        self.with_tx(|conn| {
            let Some(user) = query_user_by(conn, "username", username)? else {
                return Ok(VerifyOutcome::UserNotFound);
            };

            if parse_timestamp(&user.verify_code_expiry)? <= now {
                return Ok(VerifyOutcome::Expired);
            }
            if user.verify_code != code {
                return Ok(VerifyOutcome::IncorrectCode);
            }

            conn.execute("UPDATE users SET is_verified = 1 WHERE id = ?1", [&user.id])?;
            Ok(VerifyOutcome::Verified)
        })
    }

    /// Look a user up by email first, then by username.
    pub fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| match query_user_by(conn, "email", identifier)? {
            Some(user) => Ok(Some(user)),
            None => query_user_by(conn, "username", identifier),
        })
    }

    /// True when `username` is held: verified, or pending with an unexpired
    /// code. Same rule sign-up applies to holders under another email.
    pub fn is_username_taken(&self, username: &str, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| match query_user_by(conn, "username", username)? {
            Some(holder) => holds_username(&holder, now),
            None => Ok(false),
        })
    }

    /// Return the account owning `email`, creating a verified one on first
    /// sight. Used for users signing in through an external provider.
    pub fn find_or_create_external_user(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<UserRow> {
        self.with_tx(|conn| {
            if let Some(user) = query_user_by(conn, "email", email)? {
                return Ok(user);
            }

            let id = Uuid::new_v4().to_string();
            let mut username = external_username(email, name);
            if query_user_by(conn, "username", &username)?.is_some() {
                let base: String = username.chars().take(EXTERNAL_BASE_LEN).collect();
                username = format!("{}_{}", base, &id[..4]);
            }

            conn.execute(
                "INSERT INTO users
                     (id, username, email, password, verify_code, verify_code_expiry, is_verified)
                 VALUES (?1, ?2, ?3, ?4, '', ?5, 1)",
                (&id, &username, email, EXTERNAL_PASSWORD, timestamp(Utc::now())),
            )?;

            query_user_by(conn, "id", &id)?
                .ok_or_else(|| anyhow::anyhow!("User {} vanished after insert", id))
        })
    }

    // -- Acceptance flag --

    pub fn get_accepting_messages(&self, user_id: &str) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT is_accepting_messages FROM users WHERE id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Returns false when no such user exists.
    pub fn set_accepting_messages(&self, user_id: &str, accepting: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_accepting_messages = ?2 WHERE id = ?1",
                (user_id, accepting),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Messages --

    /// Append a message to the recipient's collection, honouring the
    /// acceptance flag in the same transaction.
    pub fn append_message(
        &self,
        username: &str,
        id: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<AppendOutcome> {
        self.with_tx(|conn| {
            let recipient: Option<(String, bool)> = conn
                .query_row(
                    "SELECT id, is_accepting_messages FROM users WHERE username = ?1",
                    [username],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match recipient {
                None => Ok(AppendOutcome::UserNotFound),
                Some((_, false)) => Ok(AppendOutcome::NotAccepting),
                Some((user_id, true)) => {
                    conn.execute(
                        "INSERT INTO messages (id, user_id, content, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        (id, &user_id, content, timestamp(created_at)),
                    )?;
                    Ok(AppendOutcome::Appended)
                }
            }
        })
    }

    /// All messages owned by `user_id`, newest first. `None` means the user
    /// does not exist; an existing user with no messages yields an empty list.
    pub fn list_messages(&self, user_id: &str) -> Result<Option<Vec<MessageRow>>> {
        self.with_conn(|conn| {
            if !user_exists(conn, user_id)? {
                return Ok(None);
            }
            query_messages(conn, user_id, false).map(Some)
        })
    }

    /// Answered messages of a user looked up by public username, newest first.
    pub fn list_replied_messages(&self, username: &str) -> Result<Option<Vec<MessageRow>>> {
        self.with_conn(|conn| {
            let user_id: Option<String> = conn
                .query_row("SELECT id FROM users WHERE username = ?1", [username], |row| {
                    row.get(0)
                })
                .optional()?;

            match user_id {
                Some(user_id) => query_messages(conn, &user_id, true).map(Some),
                None => Ok(None),
            }
        })
    }

    /// Overwrite the reply of `(user_id, message_id)`. Returns false when the
    /// user owns no such message.
    pub fn reply_to_message(
        &self,
        user_id: &str,
        message_id: &str,
        reply: &str,
    ) -> Result<bool> {
        self.with_tx(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET reply = ?3 WHERE id = ?1 AND user_id = ?2",
                (message_id, user_id, reply),
            )?;
            Ok(changed > 0)
        })
    }

    /// Remove `(user_id, message_id)`. Returns false when nothing was removed.
    pub fn delete_message(&self, user_id: &str, message_id: &str) -> Result<bool> {
        self.with_tx(|conn| {
            let changed = conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND user_id = ?2",
                (message_id, user_id),
            )?;
            Ok(changed > 0)
        })
    }
}

/// `column` is always one of our own literals, never user input.
fn query_user_by(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], user_from_row).optional()
}

fn holds_username(user: &UserRow, now: DateTime<Utc>) -> Result<bool> {
    Ok(user.is_verified || parse_timestamp(&user.verify_code_expiry)? > now)
}

fn user_exists(conn: &Connection, user_id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn query_messages(
    conn: &Connection,
    user_id: &str,
    replied_only: bool,
) -> Result<Vec<MessageRow>> {
    let filter = if replied_only {
        " AND reply IS NOT NULL AND reply <> ''"
    } else {
        ""
    };
    // rowid breaks ties between messages stored with the same timestamp
    let sql = format!(
        "SELECT {} FROM messages WHERE user_id = ?1{} ORDER BY created_at DESC, rowid DESC",
        MESSAGE_COLUMNS, filter
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([user_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                content: row.get(2)?,
                reply: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        verify_code: row.get(4)?,
        verify_code_expiry: row.get(5)?,
        is_verified: row.get(6)?,
        is_accepting_messages: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Provider display name, or the email's local part, reduced to the
/// characters allowed in usernames.
fn external_username(email: &str, name: Option<&str>) -> String {
    let source = name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email));
    let cleaned: String = source
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(MAX_USERNAME_LEN)
        .collect();
    if cleaned.len() < 2 {
        "user".to_string()
    } else {
        cleaned
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn register(db: &Database, username: &str, email: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let new = NewUser {
            id: &id,
            username,
            email,
            password_hash: "hash",
            verify_code: "123456",
            verify_code_expiry: Utc::now() + Duration::hours(1),
        };
        let outcome = db.register_user(&new, Utc::now()).unwrap();
        assert_eq!(outcome, RegisterOutcome::Created);
        id
    }

    fn send(db: &Database, username: &str, content: &str, at: DateTime<Utc>) -> String {
        let id = Uuid::new_v4().to_string();
        let outcome = db.append_message(username, &id, content, at).unwrap();
        assert_eq!(outcome, AppendOutcome::Appended);
        id
    }

    /// alice with an unanswered "hi" and an answered "yo", "yo" being newer.
    fn alice() -> (Database, String, String, String) {
        let db = Database::open_in_memory().unwrap();
        let user = register(&db, "alice", "alice@example.com");
        let t0 = Utc::now() - Duration::minutes(10);
        let hi = send(&db, "alice", "hi", t0);
        let yo = send(&db, "alice", "yo", t0 + Duration::minutes(1));
        assert!(db.reply_to_message(&user, &yo, "thanks").unwrap());
        (db, user, hi, yo)
    }

    #[test]
    fn test_messages_listed_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let user = register(&db, "bob", "bob@example.com");
        let base = Utc::now();
        for offset in [5, 1, 9, 3] {
            send(&db, "bob", "hello there", base + Duration::seconds(offset));
        }

        let rows = db.list_messages(&user).unwrap().unwrap();
        assert_eq!(rows.len(), 4);
        let stamps: Vec<DateTime<Utc>> = rows
            .iter()
            .map(|r| parse_timestamp(&r.created_at).unwrap())
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_equal_timestamps_keep_newest_insert_first() {
        let db = Database::open_in_memory().unwrap();
        let user = register(&db, "bob", "bob@example.com");
        let at = Utc::now();
        let first = send(&db, "bob", "first", at);
        let second = send(&db, "bob", "second", at);

        let rows = db.list_messages(&user).unwrap().unwrap();
        assert_eq!(rows[0].id, second);
        assert_eq!(rows[1].id, first);
    }

    #[test]
    fn test_list_distinguishes_empty_from_missing() {
        let db = Database::open_in_memory().unwrap();
        let user = register(&db, "carol", "carol@example.com");

        assert_eq!(db.list_messages(&user).unwrap().map(|m| m.len()), Some(0));
        assert!(db.list_messages("no-such-user").unwrap().is_none());
    }

    #[test]
    fn test_alice_scenario() {
        let (db, user, hi, yo) = alice();

        let all = db.list_messages(&user).unwrap().unwrap();
        let ids: Vec<&str> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![yo.as_str(), hi.as_str()]);

        let replied = db.list_replied_messages("alice").unwrap().unwrap();
        assert_eq!(replied.len(), 1);
        assert_eq!(replied[0].id, yo);

        assert!(db.delete_message(&user, &hi).unwrap());
        let all = db.list_messages(&user).unwrap().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, yo);

        assert!(db.reply_to_message(&user, &yo, "welcome").unwrap());
        let all = db.list_messages(&user).unwrap().unwrap();
        assert_eq!(all[0].reply.as_deref(), Some("welcome"));
    }

    #[test]
    fn test_deleted_message_cannot_be_touched_again() {
        let (db, user, hi, _) = alice();
        assert!(db.delete_message(&user, &hi).unwrap());
        assert!(!db.delete_message(&user, &hi).unwrap());
        assert!(!db.reply_to_message(&user, &hi, "late").unwrap());
    }

    #[test]
    fn test_reply_is_scoped_to_owner() {
        let (db, _, hi, _) = alice();
        let mallory = register(&db, "mallory", "mallory@example.com");

        assert!(!db.reply_to_message(&mallory, &hi, "gotcha").unwrap());
        assert!(!db.delete_message(&mallory, &hi).unwrap());
    }

    #[test]
    fn test_same_reply_twice_still_counts_as_found() {
        let (db, user, _, yo) = alice();
        assert!(db.reply_to_message(&user, &yo, "thanks").unwrap());
    }

    #[test]
    fn test_replied_feed_skips_empty_replies() {
        let (db, user, hi, _) = alice();
        db.with_conn(|conn| {
            conn.execute("UPDATE messages SET reply = '' WHERE id = ?1", [&hi])?;
            Ok(())
        })
        .unwrap();

        let replied = db.list_replied_messages("alice").unwrap().unwrap();
        assert!(replied.iter().all(|m| m.reply.as_deref().is_some_and(|r| !r.is_empty())));
        assert!(replied.iter().all(|m| m.user_id == user));
        assert!(db.list_replied_messages("nobody").unwrap().is_none());
    }

    #[test]
    fn test_acceptance_flag_gates_append() {
        let db = Database::open_in_memory().unwrap();
        let user = register(&db, "dave", "dave@example.com");
        assert_eq!(db.get_accepting_messages(&user).unwrap(), Some(true));

        assert!(db.set_accepting_messages(&user, false).unwrap());
        assert_eq!(db.get_accepting_messages(&user).unwrap(), Some(false));

        let outcome = db
            .append_message("dave", &Uuid::new_v4().to_string(), "hello", Utc::now())
            .unwrap();
        assert_eq!(outcome, AppendOutcome::NotAccepting);
        assert_eq!(db.list_messages(&user).unwrap().unwrap().len(), 0);

        let outcome = db
            .append_message("nobody", &Uuid::new_v4().to_string(), "hello", Utc::now())
            .unwrap();
        assert_eq!(outcome, AppendOutcome::UserNotFound);
    }

    #[test]
    fn test_acceptance_flag_missing_user() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_accepting_messages("ghost").unwrap(), None);
        assert!(!db.set_accepting_messages("ghost", true).unwrap());
    }

    #[test]
    fn test_register_conflicts() {
        let db = Database::open_in_memory().unwrap();
        register(&db, "erin", "erin@example.com");
        let new = |username: &'static str, email: &'static str| NewUser {
            id: "fixed-id",
            username,
            email,
            password_hash: "hash2",
            verify_code: "654321",
            verify_code_expiry: Utc::now() + Duration::hours(1),
        };

        // unverified, same email: refreshed in place
        assert_eq!(
            db.register_user(&new("erin", "erin@example.com"), Utc::now())
                .unwrap(),
            RegisterOutcome::Refreshed
        );
        let erin = db.get_user_by_identifier("erin").unwrap().unwrap();
        assert_eq!(erin.verify_code, "654321");
        assert_eq!(erin.password, "hash2");

        // name held by someone else's pending registration
        assert!(db.is_username_taken("erin", Utc::now()).unwrap());
        assert_eq!(
            db.register_user(&new("erin", "other@example.com"), Utc::now())
                .unwrap(),
            RegisterOutcome::UsernameTaken
        );

        assert_eq!(
            db.verify_user("erin", "654321", Utc::now()).unwrap(),
            VerifyOutcome::Verified
        );
        assert!(db.is_username_taken("erin", Utc::now()).unwrap());
        // verified holders never expire
        assert!(db.is_username_taken("erin", Utc::now() + Duration::days(2)).unwrap());
        assert_eq!(
            db.register_user(&new("erin2", "erin@example.com"), Utc::now())
                .unwrap(),
            RegisterOutcome::EmailTaken
        );
    }

    #[test]
    fn test_verify_code_outcomes() {
        let db = Database::open_in_memory().unwrap();
        register(&db, "frank", "frank@example.com");

        assert_eq!(
            db.verify_user("frank", "000000", Utc::now()).unwrap(),
            VerifyOutcome::IncorrectCode
        );
        assert_eq!(
            db.verify_user("frank", "123456", Utc::now() + Duration::hours(2)).unwrap(),
            VerifyOutcome::Expired
        );
        assert_eq!(
            db.verify_user("nobody", "123456", Utc::now()).unwrap(),
            VerifyOutcome::UserNotFound
        );
        assert!(!db.get_user_by_identifier("frank").unwrap().unwrap().is_verified);

        assert_eq!(
            db.verify_user("frank", "123456", Utc::now()).unwrap(),
            VerifyOutcome::Verified
        );
        assert!(db.get_user_by_identifier("frank").unwrap().unwrap().is_verified);
    }

    #[test]
    fn test_identifier_lookup() {
        let db = Database::open_in_memory().unwrap();
        let id = register(&db, "gina", "gina@example.com");
        assert_eq!(db.get_user_by_identifier("gina").unwrap().unwrap().id, id);
        assert_eq!(db.get_user_by_identifier("gina@example.com").unwrap().unwrap().id, id);
        assert!(db.get_user_by_identifier("nobody").unwrap().is_none());
    }

    #[test]
    fn test_external_user_created_once() {
        let db = Database::open_in_memory().unwrap();
        let first = db
            .find_or_create_external_user("harry.p@example.com", None)
            .unwrap();
        assert_eq!(first.username, "harryp");
        assert!(first.is_verified);
        assert!(first.is_external());

        let again = db
            .find_or_create_external_user("harry.p@example.com", Some("Someone Else"))
            .unwrap();
        assert_eq!(again.id, first.id);
    }

    #[test]
    fn test_external_username_collision_gets_suffix() {
        let db = Database::open_in_memory().unwrap();
        register(&db, "ivy", "ivy@example.com");
        let ext = db
            .find_or_create_external_user("ivy@other.example", Some("ivy"))
            .unwrap();
        assert_ne!(ext.username, "ivy");
        assert!(ext.username.starts_with("ivy_"));
    }

    #[test]
    fn test_expired_pending_holder_is_reclaimed() {
        let db = Database::open_in_memory().unwrap();
        let stale = register(&db, "zed", "zed@a.example");
        let later = Utc::now() + Duration::hours(2);

        assert!(db.is_username_taken("zed", Utc::now()).unwrap());
        assert!(!db.is_username_taken("zed", later).unwrap());

        let id = Uuid::new_v4().to_string();
        let outcome = db
            .register_user(
                &NewUser {
                    id: &id,
                    username: "zed",
                    email: "other@b.example",
                    password_hash: "hash",
                    verify_code: "222222",
                    verify_code_expiry: later + Duration::hours(1),
                },
                later,
            )
            .unwrap();
        assert_eq!(outcome, RegisterOutcome::Created);

        let zed = db.get_user_by_identifier("zed").unwrap().unwrap();
        assert_eq!(zed.id, id);
        assert_eq!(zed.email, "other@b.example");
        assert!(db.get_user_by_identifier("zed@a.example").unwrap().is_none());
        assert!(db.list_messages(&stale).unwrap().is_none());
    }

    #[test]
    fn test_external_username_suffix_stays_within_limit() {
        let db = Database::open_in_memory().unwrap();
        let long = "abcdefghijklmnopqrst";
        register(&db, long, "first@example.com");

        let ext = db
            .find_or_create_external_user("second@example.com", Some(long))
            .unwrap();
        assert_ne!(ext.username, long);
        assert!(ext.username.starts_with("abcdefghijklmno_"));
        assert_eq!(ext.username.len(), MAX_USERNAME_LEN);
    }
}
