/*!
`Store` methods for `student_progress` rows.
*/
use async_trait::async_trait;
use tokio_postgres::Row;

use super::{DbError, ProgressRepo, Store};
use crate::progress::Progress;

fn progress_from_row(row: &Row) -> Result<Progress, DbError> {
    Ok(Progress {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        exercise_id: row.try_get("exercise_id")?,
        completed: row.try_get("completed")?,
        score: row.try_get("score")?,
        answer: row.try_get("answer")?,
    })
}

#[async_trait]
impl ProgressRepo for Store {
    async fn progress(&self) -> Result<Vec<Progress>, DbError> {
        log::trace!("Store::progress() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM student_progress ORDER BY completed DESC",
            &[]
        ).await?;
        rows.iter().map(progress_from_row).collect()
    }

    async fn progress_by_student(&self, student_id: i64) -> Result<Vec<Progress>, DbError> {
        log::trace!("Store::progress_by_student( {} ) called.", &student_id);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM student_progress WHERE student_id = $1
                ORDER BY completed DESC",
            &[&student_id]
        ).await?;
        rows.iter().map(progress_from_row).collect()
    }

    async fn insert_progress(&self, p: &Progress) -> Result<i64, DbError> {
        log::trace!(
            "Store::insert_progress( student {}, exercise {} ) called.",
            &p.student_id, &p.exercise_id
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let row = t.query_one(
            "INSERT INTO student_progress
                (student_id, exercise_id, completed, score, answer)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id",
            &[&p.student_id, &p.exercise_id, &p.completed, &p.score, &p.answer]
        ).await.map_err(|e| DbError::from(e).annotate("Error recording progress"))?;
        let id: i64 = row.try_get("id")?;

        t.commit().await?;
        Ok(id)
    }
}
