/*!
Database interaction module.

Persistence is expressed as a set of per-entity repository traits gathered
under `Repo`. There are two implementations:

  * `Store`, which talks to Postgres, and relies on foreign-key actions to
    do its cascading;
  * `mem::MemStore`, which keeps everything in memory and performs the same
    cascades by hand. It backs the tests and the `memory` connection string.

The Postgres database is meant to have the following tables.

```sql
CREATE TABLE users (
    id            BIGSERIAL PRIMARY KEY,
    name          TEXT NOT NULL,
    email         TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    role          TEXT NOT NULL,    /* one of { 'admin', 'teacher', 'student' } */
    registered    TIMESTAMP NOT NULL,
    active        BOOL NOT NULL DEFAULT TRUE
);

CREATE TABLE levels (
    id   BIGSERIAL PRIMARY KEY,
    name TEXT UNIQUE NOT NULL
);

CREATE TABLE students (
    id       BIGSERIAL PRIMARY KEY,
    user_id  BIGINT UNIQUE NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    level_id BIGINT NOT NULL REFERENCES levels(id),
    birth    DATE NOT NULL
);

CREATE TABLE teachers (
    id       BIGSERIAL PRIMARY KEY,
    user_id  BIGINT UNIQUE NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    subject  TEXT NOT NULL,
    level_id BIGINT REFERENCES levels(id) ON DELETE SET NULL
);

CREATE TABLE lessons (
    id         BIGSERIAL PRIMARY KEY,
    teacher_id BIGINT NOT NULL REFERENCES teachers(id) ON DELETE CASCADE,
    title      TEXT NOT NULL,
    content    TEXT NOT NULL,
    video      TEXT,
    level_id   BIGINT REFERENCES levels(id) ON DELETE SET NULL
);

CREATE TABLE exercises (
    id        BIGSERIAL PRIMARY KEY,
    lesson_id BIGINT NOT NULL REFERENCES lessons(id) ON DELETE CASCADE,
    question  TEXT NOT NULL,
    kind      TEXT NOT NULL,    /* multiple_choice, fill_in_the_blank, short_answer */
    options   TEXT,             /* comma-separated */
    answer    TEXT NOT NULL
);

CREATE TABLE student_progress (
    id          BIGSERIAL PRIMARY KEY,
    student_id  BIGINT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    exercise_id BIGINT NOT NULL REFERENCES exercises(id) ON DELETE CASCADE,
    completed   TIMESTAMP NOT NULL,
    score       INTEGER,
    answer      TEXT
);
```
*/
use std::fmt::Write;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_postgres::{Client, NoTls, types::ToSql};

use crate::{
    course::{Exercise, Lesson, Level},
    progress::Progress,
    user::{NewUser, Role, Student, Teacher, User},
};

mod course;
pub mod mem;
mod progress;
mod users;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'users'",
        "CREATE TABLE users (
            id            BIGSERIAL PRIMARY KEY,
            name          TEXT NOT NULL,
            email         TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            role          TEXT NOT NULL,
            registered    TIMESTAMP NOT NULL,
            active        BOOL NOT NULL DEFAULT TRUE
        )",
        "DROP TABLE users",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'levels'",
        "CREATE TABLE levels (
            id   BIGSERIAL PRIMARY KEY,
            name TEXT UNIQUE NOT NULL
        )",
        "DROP TABLE levels",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'students'",
        "CREATE TABLE students (
            id       BIGSERIAL PRIMARY KEY,
            user_id  BIGINT UNIQUE NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            level_id BIGINT NOT NULL REFERENCES levels(id),
            birth    DATE NOT NULL
        )",
        "DROP TABLE students",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'teachers'",
        "CREATE TABLE teachers (
            id       BIGSERIAL PRIMARY KEY,
            user_id  BIGINT UNIQUE NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            subject  TEXT NOT NULL,
            level_id BIGINT REFERENCES levels(id) ON DELETE SET NULL
        )",
        "DROP TABLE teachers",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'lessons'",
        "CREATE TABLE lessons (
            id         BIGSERIAL PRIMARY KEY,
            teacher_id BIGINT NOT NULL REFERENCES teachers(id) ON DELETE CASCADE,
            title      TEXT NOT NULL,
            content    TEXT NOT NULL,
            video      TEXT,
            level_id   BIGINT REFERENCES levels(id) ON DELETE SET NULL
        )",
        "DROP TABLE lessons",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'exercises'",
        "CREATE TABLE exercises (
            id        BIGSERIAL PRIMARY KEY,
            lesson_id BIGINT NOT NULL REFERENCES lessons(id) ON DELETE CASCADE,
            question  TEXT NOT NULL,
            kind      TEXT NOT NULL,
            options   TEXT,
            answer    TEXT NOT NULL
        )",
        "DROP TABLE exercises",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'student_progress'",
        "CREATE TABLE student_progress (
            id          BIGSERIAL PRIMARY KEY,
            student_id  BIGINT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            exercise_id BIGINT NOT NULL REFERENCES exercises(id) ON DELETE CASCADE,
            completed   TIMESTAMP NOT NULL,
            score       INTEGER,
            answer      TEXT
        )",
        "DROP TABLE student_progress",
    ),
];

#[derive(Debug, PartialEq)]
pub struct DbError(String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    pub fn annotate(self, annotation: &str) -> Self {
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
            // Writing to a String can't fail.
            let _ = write!(&mut s, "; {}", dbe);
        }
        DbError(s)
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

impl From<&str> for DbError {
    fn from(s: &str) -> DbError { DbError(s.to_owned()) }
}

#[async_trait]
pub trait LevelRepo {
    async fn levels(&self) -> Result<Vec<Level>, DbError>;
    async fn level(&self, id: i64) -> Result<Option<Level>, DbError>;
    async fn level_by_name(&self, name: &str) -> Result<Option<Level>, DbError>;
    /// Returns the id of the new Level.
    async fn insert_level(&self, name: &str) -> Result<i64, DbError>;
    async fn update_level(&self, level: &Level) -> Result<(), DbError>;
    /**
    Lessons and Teachers referring to the Level have their level cleared.
    Fails if any Student is still at this Level.

    Returns `false` if there was no such Level.
    */
    async fn delete_level(&self, id: i64) -> Result<bool, DbError>;
}

#[async_trait]
pub trait UserRepo {
    async fn users(&self) -> Result<Vec<User>, DbError>;
    async fn users_with_role(&self, role: Role) -> Result<Vec<User>, DbError>;
    async fn user(&self, id: i64) -> Result<Option<User>, DbError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, DbError>;
    async fn insert_user(&self, new: &NewUser) -> Result<i64, DbError>;
    /// Writes everything but `id` and `registered`.
    async fn update_user(&self, u: &User) -> Result<(), DbError>;
    /// Also deletes the User's Student and Teacher profiles, and all that
    /// cascades from them.
    async fn delete_user(&self, id: i64) -> Result<bool, DbError>;
}

#[async_trait]
pub trait StudentRepo {
    async fn students(&self) -> Result<Vec<Student>, DbError>;
    async fn student(&self, id: i64) -> Result<Option<Student>, DbError>;
    async fn student_by_user(&self, user_id: i64) -> Result<Option<Student>, DbError>;
    /// `s.id` is ignored; returns the id of the new Student.
    async fn insert_student(&self, s: &Student) -> Result<i64, DbError>;
    async fn update_student(&self, s: &Student) -> Result<(), DbError>;
    async fn delete_student(&self, id: i64) -> Result<bool, DbError>;
}

#[async_trait]
pub trait TeacherRepo {
    async fn teachers(&self) -> Result<Vec<Teacher>, DbError>;
    async fn teacher(&self, id: i64) -> Result<Option<Teacher>, DbError>;
    async fn teacher_by_user(&self, user_id: i64) -> Result<Option<Teacher>, DbError>;
    /// `t.id` is ignored; returns the id of the new Teacher.
    async fn insert_teacher(&self, t: &Teacher) -> Result<i64, DbError>;
    async fn update_teacher(&self, t: &Teacher) -> Result<(), DbError>;
    /// Also deletes the Teacher's Lessons and their Exercises.
    async fn delete_teacher(&self, id: i64) -> Result<bool, DbError>;
}

#[async_trait]
pub trait LessonRepo {
    async fn lessons(&self) -> Result<Vec<Lesson>, DbError>;
    async fn lesson(&self, id: i64) -> Result<Option<Lesson>, DbError>;
    async fn lessons_by_teacher(&self, teacher_id: i64) -> Result<Vec<Lesson>, DbError>;
    async fn lessons_by_level(&self, level_id: i64) -> Result<Vec<Lesson>, DbError>;
    /// `l.id` is ignored; returns the id of the new Lesson.
    async fn insert_lesson(&self, l: &Lesson) -> Result<i64, DbError>;
    async fn update_lesson(&self, l: &Lesson) -> Result<(), DbError>;
    /// Also deletes the Lesson's Exercises.
    async fn delete_lesson(&self, id: i64) -> Result<bool, DbError>;
}

#[async_trait]
pub trait ExerciseRepo {
    async fn exercises(&self) -> Result<Vec<Exercise>, DbError>;
    async fn exercise(&self, id: i64) -> Result<Option<Exercise>, DbError>;
    async fn exercises_by_lesson(&self, lesson_id: i64) -> Result<Vec<Exercise>, DbError>;
    /// `x.id` is ignored; returns the id of the new Exercise.
    async fn insert_exercise(&self, x: &Exercise) -> Result<i64, DbError>;
    async fn update_exercise(&self, x: &Exercise) -> Result<(), DbError>;
    async fn delete_exercise(&self, id: i64) -> Result<bool, DbError>;
}

#[async_trait]
pub trait ProgressRepo {
    async fn progress(&self) -> Result<Vec<Progress>, DbError>;
    async fn progress_by_student(&self, student_id: i64) -> Result<Vec<Progress>, DbError>;
    /// `p.id` is ignored; returns the id of the new record.
    async fn insert_progress(&self, p: &Progress) -> Result<i64, DbError>;
}

/// Everything the web layer needs from a data store.
#[async_trait]
pub trait Repo:
    LevelRepo + UserRepo + StudentRepo + TeacherRepo
    + LessonRepo + ExerciseRepo + ProgressRepo
    + Send + Sync
{
    /// Make sure all tables exist.
    async fn ensure_db_schema(&self) -> Result<(), DbError>;

    /// Insert a batch of Levels, skipping any whose names are already taken.
    ///
    /// Returns the number actually inserted.
    async fn insert_levels(&self, names: &[&str]) -> Result<usize, DbError>;
}

/// Postgres-backed `Repo`.
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

        log::trace!("    ....nuking complete.");
        Ok(())
    }
}

#[async_trait]
impl Repo for Store {
    async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    async fn insert_levels(&self, names: &[&str]) -> Result<usize, DbError> {
        log::trace!("Store::insert_levels( {:?} ) called.", names);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let insert_statement = t.prepare(
            "INSERT INTO levels (name) VALUES ($1)
                ON CONFLICT (name) DO NOTHING"
        ).await?;

        let mut n_inserted: u64 = 0;
        {
            // The parameter slices must outlive the futures that borrow them.
            let pvec: Vec<[&(dyn ToSql + Sync); 1]> = names.iter()
                .map(|name| {
                    let p: [&(dyn ToSql + Sync); 1] = [name];
                    p
                }).collect();

            let mut inserts = FuturesUnordered::new();
            for params in pvec.iter() {
                inserts.push(t.execute(&insert_statement, &params[..]));
            }

            while let Some(res) = inserts.next().await {
                match res {
                    Ok(n) => { n_inserted += n; },
                    Err(e) => {
                        return Err(DbError::from(e)
                            .annotate("Error inserting level"));
                    },
                }
            }
        }

        t.commit().await?;
        Ok(n_inserted as usize)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    /*!
    The Postgres tests assume you have a Postgres instance running on your
    local machine with resources named according to what you see in the
    `static TEST_CONNECTION &str`:

    ```text
    user: aula_test
    password: aula_test

    with write access to:

    database: aula_store_test
    ```

    They are ignored by default; run them with

    ```bash
    cargo test -- --ignored
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    pub static TEST_CONNECTION: &str = "host=localhost user=aula_test password='aula_test' dbname=aula_store_test";

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
    #[ignore]
    #[serial]
    async fn create_store() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        // Twice, to make sure it notices the tables are there.
        db.ensure_db_schema().await.unwrap();
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn seed_levels() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let names = ["Principiante", "Intermedio", "Avanzado"];
        assert_eq!(db.insert_levels(&names).await.unwrap(), 3);
        assert_eq!(db.insert_levels(&names).await.unwrap(), 0);
        assert_eq!(db.levels().await.unwrap().len(), 3);

        db.nuke_database().await.unwrap();
    }
}
