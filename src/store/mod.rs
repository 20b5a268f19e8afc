/*!
Database interaction module.

The Postgres database to which this connects holds six tables: users,
subjects, teacher_subject_assignments, student_enrollments, grades, and
registration_requests. `ensure_db_schema()` brings a blank database up to
speed at startup; there is no migrations framework beyond that.

Submodules hang `Store` methods for each resource family:

  * `users` — shadow user records and the cascading delete;
  * `subjects` — the subject catalog, teacher assignments, enrollments;
  * `grades` — grade entry and the filtered report queries;
  * `registrations` — the registration-request workflow.
*/
use std::fmt::Write;

use tokio_postgres::{Client, NoTls};

pub mod grades;
pub mod registrations;
pub mod subjects;
pub mod users;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'users'",
        "CREATE TABLE users (
            id          BIGSERIAL PRIMARY KEY,
            provider_id TEXT UNIQUE NOT NULL,
            name        TEXT NOT NULL,
            email       TEXT UNIQUE NOT NULL,
            role        TEXT NOT NULL   /* one of { 'admin', 'teacher', 'student' } */
        )",
        "DROP TABLE users",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'subjects'",
        "CREATE TABLE subjects (
            id          BIGSERIAL PRIMARY KEY,
            name        TEXT NOT NULL,
            code        TEXT UNIQUE NOT NULL,
            description TEXT,
            credits     INTEGER NOT NULL DEFAULT 0
        )",
        "DROP TABLE subjects",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'teacher_subject_assignments'",
        "CREATE TABLE teacher_subject_assignments (
            id            BIGSERIAL PRIMARY KEY,
            teacher_id    BIGINT NOT NULL REFERENCES users(id),
            subject_id    BIGINT NOT NULL REFERENCES subjects(id),
            academic_year TEXT NOT NULL,
            UNIQUE (teacher_id, subject_id, academic_year)
        )",
        "DROP TABLE teacher_subject_assignments",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'student_enrollments'",
        "CREATE TABLE student_enrollments (
            id            BIGSERIAL PRIMARY KEY,
            student_id    BIGINT NOT NULL REFERENCES users(id),
            subject_id    BIGINT NOT NULL REFERENCES subjects(id),
            academic_year TEXT NOT NULL,
            UNIQUE (student_id, subject_id, academic_year)
        )",
        "DROP TABLE student_enrollments",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'grades'",
        "CREATE TABLE grades (
            id            BIGSERIAL PRIMARY KEY,
            student_id    BIGINT NOT NULL REFERENCES users(id),
            subject_id    BIGINT NOT NULL REFERENCES subjects(id),
            teacher_id    BIGINT NOT NULL REFERENCES users(id),
            score         DOUBLE PRECISION NOT NULL,
            term          TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            comment       TEXT,
            created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE grades",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'registration_requests'",
        "CREATE TABLE registration_requests (
            id            BIGSERIAL PRIMARY KEY,
            student_id    BIGINT NOT NULL REFERENCES users(id),
            subject_id    BIGINT NOT NULL REFERENCES subjects(id),
            academic_year TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'pending',
            reason        TEXT,
            admin_note    TEXT,
            approved_by   BIGINT REFERENCES users(id),
            requested_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            approved_at   TIMESTAMPTZ
        )",
        "DROP TABLE registration_requests",
    ),

    // Lookup indexes for the registration list filters.

    (
        "SELECT FROM pg_indexes WHERE indexname = 'registration_requests_student_idx'",
        "CREATE INDEX registration_requests_student_idx
            ON registration_requests (student_id)",
        "DROP INDEX registration_requests_student_idx",
    ),

    (
        "SELECT FROM pg_indexes WHERE indexname = 'registration_requests_subject_idx'",
        "CREATE INDEX registration_requests_subject_idx
            ON registration_requests (subject_id)",
        "DROP INDEX registration_requests_subject_idx",
    ),

    (
        "SELECT FROM pg_indexes WHERE indexname = 'registration_requests_status_idx'",
        "CREATE INDEX registration_requests_status_idx
            ON registration_requests (status)",
        "DROP INDEX registration_requests_status_idx",
    ),

    (
        "SELECT FROM pg_indexes WHERE indexname = 'registration_requests_year_idx'",
        "CREATE INDEX registration_requests_year_idx
            ON registration_requests (academic_year)",
        "DROP INDEX registration_requests_year_idx",
    ),
];

#[derive(Debug, PartialEq)]
pub struct DbError(String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let mut s = format!("Data DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            write!(&mut s, "; {}", dbe).unwrap();
        }
        DbError(s)
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

pub struct Store {
    connection_string: String,
}

impl Store {
    pub fn new(connection_string: String) -> Self {
        log::trace!("Store::new( {:?} ) called.", &connection_string);

        Self { connection_string }
    }

    async fn connect(&self) -> Result<Client, DbError> {
        log::trace!(
            "Store::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Data DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError::from(e);
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to create.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look at
    the ERROR level log output when testing to ensure this method did its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        log::trace!("    ...nuking complete.");
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    /*!
    These tests assume you have a Postgres instance running on your local
    machine with resources named according to what you see in the
    `static TEST_CONNECTION &str`:

    ```text
    user: gradeview_test
    password: gradeview_test

    with write access to:

    database: gradeview_test
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    pub static TEST_CONNECTION: &str = "host=localhost user=gradeview_test password='gradeview_test' dbname=gradeview_test";

    /**
    This function is for getting the database back in a blank slate state if
    a test panics partway through and leaves it munged.

    ```bash
    cargo test reset_store -- --ignored
    ```
    */
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_store() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn create_store() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        db.nuke_database().await.unwrap();
    }
}
