//! Student roster repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{Student, StudentId};
use libsql::{params, Connection, Row, Value};

use super::normalize::{normalize_handle, normalize_student};

const STUDENT_COLUMNS: &str = "id, name, email, phone, cf_handle, current_rating, max_rating, \
                               is_active, last_sync, created_at, updated_at";

/// Trait for student storage operations (async)
#[allow(async_fn_in_trait)]
pub trait StudentRepository {
    /// Insert a new student after normalization
    async fn create(&self, student: Student) -> Result<Student>;

    /// Get a student by ID
    async fn get(&self, id: &StudentId) -> Result<Option<Student>>;

    /// List students ordered by name
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Student>>;

    /// List students that have a handle configured
    async fn list_with_handle(&self) -> Result<Vec<Student>>;

    /// Resolve full ids starting with `prefix`
    async fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;

    /// Replace (or clear) a student's handle
    async fn set_handle(&self, id: &StudentId, handle: Option<String>) -> Result<Student>;

    /// Advance the sync watermark timestamp; never moves it backwards
    async fn touch_last_sync(&self, id: &StudentId, at: i64) -> Result<()>;

    /// Delete a student and, by cascade, their synced records
    async fn delete(&self, id: &StudentId) -> Result<()>;
}

/// libSQL implementation of `StudentRepository`
pub struct LibSqlStudentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlStudentRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_student(row: &Row) -> Result<Student> {
        let id: String = row.get(0)?;
        Ok(Student {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid student ID: {id}")))?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get::<Option<String>>(3)?,
            cf_handle: row.get::<Option<String>>(4)?,
            current_rating: row.get(5)?,
            max_rating: row.get(6)?,
            is_active: row.get::<i64>(7)? != 0,
            last_sync: row.get::<Option<i64>>(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    async fn collect(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Student>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut students = Vec::new();
        while let Some(row) = rows.next().await? {
            students.push(Self::parse_student(&row)?);
        }
        Ok(students)
    }
}

impl StudentRepository for LibSqlStudentRepository<'_> {
    async fn create(&self, student: Student) -> Result<Student> {
        let now = chrono::Utc::now().timestamp_millis();
        let student = normalize_student(student, now)?;

        self.conn
            .execute(
                "INSERT INTO students (id, name, email, phone, cf_handle, current_rating,
                    max_rating, is_active, last_sync, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    student.id.as_str(),
                    student.name.clone(),
                    student.email.clone(),
                    text_or_null(student.phone.clone()),
                    text_or_null(student.cf_handle.clone()),
                    student.current_rating,
                    student.max_rating,
                    i64::from(student.is_active),
                    int_or_null(student.last_sync),
                    student.created_at,
                    student.updated_at
                ],
            )
            .await
            .map_err(map_unique_violation)?;

        Ok(student)
    }

    async fn get(&self, id: &StudentId) -> Result<Option<Student>> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
        let mut students = self.collect(&sql, vec![Value::Text(id.as_str())]).await?;
        Ok(students.pop())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Student>> {
        let sql = format!(
            "SELECT {STUDENT_COLUMNS} FROM students
             ORDER BY name COLLATE NOCASE ASC, id ASC
             LIMIT ? OFFSET ?"
        );
        self.collect(
            &sql,
            vec![Value::Integer(limit as i64), Value::Integer(offset as i64)],
        )
        .await
    }

    async fn list_with_handle(&self) -> Result<Vec<Student>> {
        let sql = format!(
            "SELECT {STUDENT_COLUMNS} FROM students
             WHERE cf_handle IS NOT NULL AND TRIM(cf_handle) <> ''
             ORDER BY name COLLATE NOCASE ASC, id ASC"
        );
        self.collect(&sql, Vec::new()).await
    }

    async fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let pattern = format!("{}%", prefix.trim().replace(['%', '_'], ""));
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM students WHERE id LIKE ? ORDER BY id LIMIT ?",
                params![pattern, limit as i64],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    async fn set_handle(&self, id: &StudentId, handle: Option<String>) -> Result<Student> {
        let handle = normalize_handle(handle)?;
        let now = chrono::Utc::now().timestamp_millis();

        let rows = self
            .conn
            .execute(
                "UPDATE students SET cf_handle = ?, updated_at = ? WHERE id = ?",
                params![text_or_null(handle), now, id.as_str()],
            )
            .await
            .map_err(map_unique_violation)?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn touch_last_sync(&self, id: &StudentId, at: i64) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE students
                 SET last_sync = MAX(COALESCE(last_sync, 0), ?1), updated_at = ?1
                 WHERE id = ?2",
                params![at, id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: &StudentId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM students WHERE id = ?", [id.as_str()])
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }
}

pub(crate) fn text_or_null(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

pub(crate) fn int_or_null(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn map_unique_violation(error: libsql::Error) -> Error {
    let message = error.to_string();
    if message.contains("UNIQUE constraint failed") {
        let column = message
            .rsplit("students.")
            .next()
            .unwrap_or("value")
            .trim()
            .to_string();
        Error::Conflict(format!("a student with this {column} already exists"))
    } else {
        Error::LibSql(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::NewStudent;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn new_student(name: &str, email: &str, handle: Option<&str>) -> Student {
        Student::new(NewStudent {
            name: name.to_string(),
            email: email.to_string(),
            cf_handle: handle.map(ToString::to_string),
            ..NewStudent::default()
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_and_get() {
        let db = setup().await;
        let repo = LibSqlStudentRepository::new(db.connection());

        let created = repo
            .create(new_student(" Ann ", "ANN@example.com", Some("ann_cf")))
            .await
            .unwrap();
        assert_eq!(created.name, "Ann");

        let fetched = repo.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.email, "ann@example.com");
        assert!(fetched.last_sync.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_handle_is_conflict() {
        let db = setup().await;
        let repo = LibSqlStudentRepository::new(db.connection());

        repo.create(new_student("Ann", "ann@example.com", Some("shared")))
            .await
            .unwrap();
        let error = repo
            .create(new_student("Bob", "bob@example.com", Some("shared")))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Conflict(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_with_handle_skips_missing_handles() {
        let db = setup().await;
        let repo = LibSqlStudentRepository::new(db.connection());

        repo.create(new_student("Ann", "ann@example.com", Some("ann_cf")))
            .await
            .unwrap();
        repo.create(new_student("Bob", "bob@example.com", None))
            .await
            .unwrap();

        assert_eq!(repo.list(10, 0).await.unwrap().len(), 2);
        let with_handle = repo.list_with_handle().await.unwrap();
        assert_eq!(with_handle.len(), 1);
        assert_eq!(with_handle[0].name, "Ann");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_touch_last_sync_is_monotonic() {
        let db = setup().await;
        let repo = LibSqlStudentRepository::new(db.connection());
        let student = repo
            .create(new_student("Ann", "ann@example.com", Some("ann_cf")))
            .await
            .unwrap();

        repo.touch_last_sync(&student.id, 2_000).await.unwrap();
        repo.touch_last_sync(&student.id, 1_000).await.unwrap();

        let fetched = repo.get(&student.id).await.unwrap().unwrap();
        assert_eq!(fetched.last_sync, Some(2_000));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_handle_clears_and_validates() {
        let db = setup().await;
        let repo = LibSqlStudentRepository::new(db.connection());
        let student = repo
            .create(new_student("Ann", "ann@example.com", Some("ann_cf")))
            .await
            .unwrap();

        let cleared = repo.set_handle(&student.id, None).await.unwrap();
        assert_eq!(cleared.cf_handle, None);

        assert!(repo
            .set_handle(&student.id, Some("no spaces".to_string()))
            .await
            .is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_prefix_lookup_and_delete() {
        let db = setup().await;
        let repo = LibSqlStudentRepository::new(db.connection());
        let student = repo
            .create(new_student("Ann", "ann@example.com", None))
            .await
            .unwrap();

        let id = student.id.to_string();
        let matches = repo.list_ids_by_prefix(&id[..8], 3).await.unwrap();
        assert_eq!(matches, vec![id]);

        repo.delete(&student.id).await.unwrap();
        assert!(repo.get(&student.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(&student.id).await,
            Err(Error::NotFound(_))
        ));
    }
}
