use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use shared::{Holiday, Student};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::traits::{HolidayStorage, RecordStore, StorageMode, StudentStorage};
use crate::domain::error::{RecordError, RecordResult};

const STUDENT_COLUMNS: &str =
    "id, name, email, dob, age, number, regno, classno, photo, status, created_at";

/// DbConnection manages database operations
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Connect to the database described by `url` and make sure the schema exists.
    ///
    /// The database is expected to be provisioned already; whether a missing
    /// SQLite file may be created is controlled by the URL (`mode=rwc`).
    pub async fn connect(url: &str, acquire_timeout: Duration) -> sqlx::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?;

        let pool = SqlitePoolOptions::new()
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await?;

        Self::setup_schema(&pool).await?;

        Ok(Self { pool: Arc::new(pool) })
    }

    /// Initialize a test database with a unique name
    #[cfg(test)]
    pub async fn init_test() -> sqlx::Result<Self> {
        let test_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        Self::connect(&db_url, Duration::from_secs(5)).await
    }

    /// Set up the required database schema
    async fn setup_schema(pool: &SqlitePool) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT,
                dob TEXT,
                age INTEGER,
                number TEXT,
                regno TEXT NOT NULL,
                regno_key TEXT NOT NULL UNIQUE,
                classno TEXT NOT NULL,
                photo TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        // Roster queries filter by class and sort by name
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_students_classno
            ON students(classno, name COLLATE NOCASE);
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_students_created_at
            ON students(created_at DESC);
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS holidays (
                id TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_holidays_date
            ON holidays(date);
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[derive(FromRow)]
struct StudentRow {
    id: String,
    name: String,
    email: Option<String>,
    dob: Option<String>,
    age: Option<i64>,
    number: Option<String>,
    regno: String,
    classno: String,
    photo: Option<String>,
    status: String,
    created_at: String,
}

impl TryFrom<StudentRow> for Student {
    type Error = RecordError;

    fn try_from(row: StudentRow) -> RecordResult<Self> {
        let dob = row.dob.as_deref().map(decode_date).transpose()?;
        let age = row
            .age
            .map(|age| {
                u8::try_from(age).map_err(|_| corrupt(format!("age {} out of range", age)))
            })
            .transpose()?;
        let status = row
            .status
            .parse()
            .map_err(|e: shared::InvalidStatus| corrupt(e.to_string()))?;

        Ok(Student {
            id: row.id,
            name: row.name,
            email: row.email,
            dob,
            age,
            number: row.number,
            regno: row.regno,
            classno: row.classno,
            photo: row.photo,
            status,
            created_at: decode_timestamp(&row.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct HolidayRow {
    id: String,
    date: String,
    description: String,
    created_at: String,
}

impl TryFrom<HolidayRow> for Holiday {
    type Error = RecordError;

    fn try_from(row: HolidayRow) -> RecordResult<Self> {
        Ok(Holiday {
            id: row.id,
            date: decode_date(&row.date)?,
            description: row.description,
            created_at: decode_timestamp(&row.created_at)?,
        })
    }
}

/// Fixed-width RFC 3339 so that text ordering equals time ordering
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_timestamp(raw: &str) -> RecordResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| corrupt(format!("bad timestamp '{}': {}", raw, e)))
}

fn encode_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn decode_date(raw: &str) -> RecordResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| corrupt(format!("bad date '{}': {}", raw, e)))
}

fn corrupt(message: String) -> RecordError {
    RecordError::StorageUnavailable(anyhow::anyhow!("corrupt row: {}", message))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn into_students(rows: Vec<StudentRow>) -> RecordResult<Vec<Student>> {
    rows.into_iter().map(Student::try_from).collect()
}

#[async_trait]
impl StudentStorage for DbConnection {
    async fn insert_student(&self, student: &Student) -> RecordResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO students
                (id, name, email, dob, age, number, regno, regno_key, classno, photo, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&student.id)
        .bind(&student.name)
        .bind(&student.email)
        .bind(student.dob.as_ref().map(encode_date))
        .bind(student.age.map(i64::from))
        .bind(&student.number)
        .bind(&student.regno)
        .bind(Student::regno_key(&student.regno))
        .bind(&student.classno)
        .bind(&student.photo)
        .bind(student.status.as_str())
        .bind(encode_timestamp(&student.created_at))
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(RecordError::DuplicateKey(student.regno.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_student(&self, regno: &str) -> RecordResult<Option<Student>> {
        let row: Option<StudentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM students WHERE regno_key = ?",
            STUDENT_COLUMNS
        ))
        .bind(Student::regno_key(regno))
        .fetch_optional(&*self.pool)
        .await?;

        row.map(Student::try_from).transpose()
    }

    async fn list_students(&self) -> RecordResult<Vec<Student>> {
        let rows: Vec<StudentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM students ORDER BY created_at DESC, id DESC",
            STUDENT_COLUMNS
        ))
        .fetch_all(&*self.pool)
        .await?;

        into_students(rows)
    }

    async fn list_students_in_class(&self, classno: &str) -> RecordResult<Vec<Student>> {
        let rows: Vec<StudentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM students WHERE classno = ? \
             ORDER BY name COLLATE NOCASE, name, created_at",
            STUDENT_COLUMNS
        ))
        .bind(classno)
        .fetch_all(&*self.pool)
        .await?;

        into_students(rows)
    }

    async fn replace_student(&self, student: &Student) -> RecordResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE students
            SET name = ?, email = ?, dob = ?, age = ?, number = ?,
                classno = ?, photo = ?, status = ?
            WHERE id = ?
            "#,
        )
        .bind(&student.name)
        .bind(&student.email)
        .bind(student.dob.as_ref().map(encode_date))
        .bind(student.age.map(i64::from))
        .bind(&student.number)
        .bind(&student.classno)
        .bind(&student.photo)
        .bind(student.status.as_str())
        .bind(&student.id)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_student(&self, regno: &str) -> RecordResult<Option<Student>> {
        let Some(student) = self.find_student(regno).await? else {
            return Ok(None);
        };

        let result = sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(&student.id)
            .execute(&*self.pool)
            .await?;

        Ok((result.rows_affected() > 0).then_some(student))
    }

    async fn delete_all_students(&self) -> RecordResult<u64> {
        let result = sqlx::query("DELETE FROM students")
            .execute(&*self.pool)
            .await?;
        debug!("Deleted {} student rows", result.rows_affected());
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl HolidayStorage for DbConnection {
    async fn insert_holiday(&self, holiday: &Holiday) -> RecordResult<()> {
        sqlx::query(
            "INSERT INTO holidays (id, date, description, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&holiday.id)
        .bind(encode_date(&holiday.date))
        .bind(&holiday.description)
        .bind(encode_timestamp(&holiday.created_at))
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn get_holiday(&self, id: &str) -> RecordResult<Option<Holiday>> {
        let row: Option<HolidayRow> =
            sqlx::query_as("SELECT id, date, description, created_at FROM holidays WHERE id = ?")
                .bind(id)
                .fetch_optional(&*self.pool)
                .await?;

        row.map(Holiday::try_from).transpose()
    }

    async fn list_holidays(&self) -> RecordResult<Vec<Holiday>> {
        let rows: Vec<HolidayRow> = sqlx::query_as(
            "SELECT id, date, description, created_at FROM holidays \
             ORDER BY date, created_at, id",
        )
        .fetch_all(&*self.pool)
        .await?;

        rows.into_iter().map(Holiday::try_from).collect()
    }

    async fn replace_holiday(&self, holiday: &Holiday) -> RecordResult<bool> {
        let result = sqlx::query("UPDATE holidays SET date = ?, description = ? WHERE id = ?")
            .bind(encode_date(&holiday.date))
            .bind(&holiday.description)
            .bind(&holiday.id)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_holiday(&self, id: &str) -> RecordResult<bool> {
        let result = sqlx::query("DELETE FROM holidays WHERE id = ?")
            .bind(id)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl RecordStore for DbConnection {
    fn mode(&self) -> StorageMode {
        StorageMode::Database
    }
}
