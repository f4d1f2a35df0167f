/*!
`Store` methods for Levels, Lessons and Exercises.
*/
use async_trait::async_trait;
use tokio_postgres::Row;

use super::{DbError, ExerciseRepo, LessonRepo, LevelRepo, Store};
use crate::course::{Exercise, Lesson, Level};

fn level_from_row(row: &Row) -> Result<Level, DbError> {
    Ok(Level {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
    })
}

fn lesson_from_row(row: &Row) -> Result<Lesson, DbError> {
    Ok(Lesson {
        id: row.try_get("id")?,
        teacher_id: row.try_get("teacher_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        video: row.try_get("video")?,
        level_id: row.try_get("level_id")?,
    })
}

fn exercise_from_row(row: &Row) -> Result<Exercise, DbError> {
    let kind_str: &str = row.try_get("kind")?;
    Ok(Exercise {
        id: row.try_get("id")?,
        lesson_id: row.try_get("lesson_id")?,
        question: row.try_get("question")?,
        kind: kind_str.parse()?,
        options: row.try_get("options")?,
        answer: row.try_get("answer")?,
    })
}

#[async_trait]
impl LevelRepo for Store {
    async fn levels(&self) -> Result<Vec<Level>, DbError> {
        log::trace!("Store::levels() called.");

        let client = self.connect().await?;
        let rows = client.query("SELECT * FROM levels ORDER BY id", &[]).await?;
        rows.iter().map(level_from_row).collect()
    }

    async fn level(&self, id: i64) -> Result<Option<Level>, DbError> {
        log::trace!("Store::level( {} ) called.", &id);

        let client = self.connect().await?;
        match client.query_opt("SELECT * FROM levels WHERE id = $1", &[&id]).await? {
            None => Ok(None),
            Some(row) => Ok(Some(level_from_row(&row)?)),
        }
    }

    async fn level_by_name(&self, name: &str) -> Result<Option<Level>, DbError> {
        log::trace!("Store::level_by_name( {:?} ) called.", name);

        let client = self.connect().await?;
        match client.query_opt("SELECT * FROM levels WHERE name = $1", &[&name]).await? {
            None => Ok(None),
            Some(row) => Ok(Some(level_from_row(&row)?)),
        }
    }

    async fn insert_level(&self, name: &str) -> Result<i64, DbError> {
        log::trace!("Store::insert_level( {:?} ) called.", name);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let row = t.query_one(
            "INSERT INTO levels (name) VALUES ($1) RETURNING id",
            &[&name]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting level"))?;
        let id: i64 = row.try_get("id")?;

        t.commit().await?;
        Ok(id)
    }

    async fn update_level(&self, level: &Level) -> Result<(), DbError> {
        log::trace!("Store::update_level( {:?} ) called.", level);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute(
            "UPDATE levels SET name = $1 WHERE id = $2",
            &[&level.name, &level.id]
        ).await.map_err(|e| DbError::from(e).annotate("Error updating level"))?;

        if n == 0 {
            return Err(DbError(format!("There is no level with id {}.", &level.id)));
        }

        t.commit().await?;
        Ok(())
    }

    async fn delete_level(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_level( {} ) called.", &id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute("DELETE FROM levels WHERE id = $1", &[&id]).await
            .map_err(|e| DbError::from(e).annotate("Error deleting level"))?;

        t.commit().await?;
        Ok(n > 0)
    }
}

#[async_trait]
impl LessonRepo for Store {
    async fn lessons(&self) -> Result<Vec<Lesson>, DbError> {
        log::trace!("Store::lessons() called.");

        let client = self.connect().await?;
        let rows = client.query("SELECT * FROM lessons ORDER BY id", &[]).await?;
        rows.iter().map(lesson_from_row).collect()
    }

    async fn lesson(&self, id: i64) -> Result<Option<Lesson>, DbError> {
        log::trace!("Store::lesson( {} ) called.", &id);

        let client = self.connect().await?;
        match client.query_opt("SELECT * FROM lessons WHERE id = $1", &[&id]).await? {
            None => Ok(None),
            Some(row) => Ok(Some(lesson_from_row(&row)?)),
        }
    }

    async fn lessons_by_teacher(&self, teacher_id: i64) -> Result<Vec<Lesson>, DbError> {
        log::trace!("Store::lessons_by_teacher( {} ) called.", &teacher_id);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM lessons WHERE teacher_id = $1 ORDER BY id",
            &[&teacher_id]
        ).await?;
        rows.iter().map(lesson_from_row).collect()
    }

    async fn lessons_by_level(&self, level_id: i64) -> Result<Vec<Lesson>, DbError> {
        log::trace!("Store::lessons_by_level( {} ) called.", &level_id);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM lessons WHERE level_id = $1 ORDER BY id",
            &[&level_id]
        ).await?;
        rows.iter().map(lesson_from_row).collect()
    }

    async fn insert_lesson(&self, l: &Lesson) -> Result<i64, DbError> {
        log::trace!("Store::insert_lesson( {:?} ) called.", &l.title);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let row = t.query_one(
            "INSERT INTO lessons (teacher_id, title, content, video, level_id)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id",
            &[&l.teacher_id, &l.title, &l.content, &l.video, &l.level_id]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting lesson"))?;
        let id: i64 = row.try_get("id")?;

        t.commit().await?;
        Ok(id)
    }

    async fn update_lesson(&self, l: &Lesson) -> Result<(), DbError> {
        log::trace!("Store::update_lesson( {} ) called.", &l.id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute(
            "UPDATE lessons SET
                teacher_id = $1, title = $2, content = $3, video = $4, level_id = $5
                WHERE id = $6",
            &[&l.teacher_id, &l.title, &l.content, &l.video, &l.level_id, &l.id]
        ).await.map_err(|e| DbError::from(e).annotate("Error updating lesson"))?;

        if n == 0 {
            return Err(DbError(format!("There is no lesson with id {}.", &l.id)));
        }

        t.commit().await?;
        Ok(())
    }

    async fn delete_lesson(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_lesson( {} ) called.", &id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute("DELETE FROM lessons WHERE id = $1", &[&id]).await
            .map_err(|e| DbError::from(e).annotate("Error deleting lesson"))?;

        t.commit().await?;
        Ok(n > 0)
    }
}

#[async_trait]
impl ExerciseRepo for Store {
    async fn exercises(&self) -> Result<Vec<Exercise>, DbError> {
        log::trace!("Store::exercises() called.");

        let client = self.connect().await?;
        let rows = client.query("SELECT * FROM exercises ORDER BY id", &[]).await?;
        rows.iter().map(exercise_from_row).collect()
    }

    async fn exercise(&self, id: i64) -> Result<Option<Exercise>, DbError> {
        log::trace!("Store::exercise( {} ) called.", &id);

        let client = self.connect().await?;
        match client.query_opt("SELECT * FROM exercises WHERE id = $1", &[&id]).await? {
            None => Ok(None),
            Some(row) => Ok(Some(exercise_from_row(&row)?)),
        }
    }

    async fn exercises_by_lesson(&self, lesson_id: i64) -> Result<Vec<Exercise>, DbError> {
        log::trace!("Store::exercises_by_lesson( {} ) called.", &lesson_id);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM exercises WHERE lesson_id = $1 ORDER BY id",
            &[&lesson_id]
        ).await?;
        rows.iter().map(exercise_from_row).collect()
    }

    async fn insert_exercise(&self, x: &Exercise) -> Result<i64, DbError> {
        log::trace!("Store::insert_exercise( {:?} ) called.", &x.question);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let row = t.query_one(
            "INSERT INTO exercises (lesson_id, question, kind, options, answer)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id",
            &[&x.lesson_id, &x.question, &x.kind.as_str(), &x.options, &x.answer]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting exercise"))?;
        let id: i64 = row.try_get("id")?;

        t.commit().await?;
        Ok(id)
    }

    async fn update_exercise(&self, x: &Exercise) -> Result<(), DbError> {
        log::trace!("Store::update_exercise( {} ) called.", &x.id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute(
            "UPDATE exercises SET
                lesson_id = $1, question = $2, kind = $3, options = $4, answer = $5
                WHERE id = $6",
            &[&x.lesson_id, &x.question, &x.kind.as_str(), &x.options, &x.answer, &x.id]
        ).await.map_err(|e| DbError::from(e).annotate("Error updating exercise"))?;

        if n == 0 {
            return Err(DbError(format!("There is no exercise with id {}.", &x.id)));
        }

        t.commit().await?;
        Ok(())
    }

    async fn delete_exercise(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_exercise( {} ) called.", &id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute("DELETE FROM exercises WHERE id = $1", &[&id]).await
            .map_err(|e| DbError::from(e).annotate("Error deleting exercise"))?;

        t.commit().await?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::course::ExerciseKind;
    use crate::store::{Repo, TeacherRepo, UserRepo};
    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;
    use crate::user::{NewUser, Role, Teacher};

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn level_names_unique() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let id = db.insert_level("Principiante").await.unwrap();
        assert!(db.insert_level("Principiante").await.is_err());
        assert_eq!(db.level_by_name("Principiante").await.unwrap().unwrap().id, id);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn teacher_and_level_cascades() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let level_id = db.insert_level("Avanzado").await.unwrap();
        let uid = db.insert_user(&NewUser {
            name: "Profesor Maria".to_owned(),
            email: "maria@example.com".to_owned(),
            password_hash: "$argon2id$placeholder".to_owned(),
            role: Role::Teacher,
        }).await.unwrap();
        let tid = db.insert_teacher(&Teacher {
            id: 0, user_id: uid,
            subject: "Gramática Inglesa".to_owned(),
            level_id: Some(level_id),
        }).await.unwrap();

        let lesson = Lesson {
            id: 0,
            teacher_id: tid,
            title: "Past simple".to_owned(),
            content: "Regular and irregular verbs.".to_owned(),
            video: None,
            level_id: Some(level_id),
        };
        let lid = db.insert_lesson(&lesson).await.unwrap();
        let xid = db.insert_exercise(&Exercise {
            id: 0,
            lesson_id: lid,
            question: "Past of 'go'?".to_owned(),
            kind: ExerciseKind::ShortAnswer,
            options: None,
            answer: "went".to_owned(),
        }).await.unwrap();

        // Deleting the Level only clears references to it.
        assert!(db.delete_level(level_id).await.unwrap());
        assert_eq!(db.lesson(lid).await.unwrap().unwrap().level_id, None);
        assert_eq!(db.teacher(tid).await.unwrap().unwrap().level_id, None);

        // Deleting the Teacher takes Lessons and Exercises with it.
        assert!(db.delete_teacher(tid).await.unwrap());
        assert!(db.lesson(lid).await.unwrap().is_none());
        assert!(db.exercise(xid).await.unwrap().is_none());

        db.nuke_database().await.unwrap();
    }
}
