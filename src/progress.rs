/*!
Records of students working through exercises.
*/
use serde::Serialize;
use time::PrimitiveDateTime;

use crate::course::Exercise;

/// Score awarded for a correct answer; wrong answers get zero.
pub const FULL_SCORE: i32 = 100;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Progress {
    pub id: i64,
    pub student_id: i64,
    pub exercise_id: i64,
    pub completed: PrimitiveDateTime,
    pub score: Option<i32>,
    /// What the student actually submitted.
    pub answer: Option<String>,
}

impl Progress {
    /// Grade `response` against `ex` and produce a record ready for
    /// insertion. The store assigns the id.
    pub fn grade(student_id: i64, ex: &Exercise, response: &str) -> Progress {
        let score = if ex.is_correct(response) { FULL_SCORE } else { 0 };

        Progress {
            id: 0,
            student_id,
            exercise_id: ex.id,
            completed: crate::now(),
            score: Some(score),
            answer: Some(response.trim().to_owned()),
        }
    }

    pub fn passed(&self) -> bool {
        self.score == Some(FULL_SCORE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::ExerciseKind;

    #[test]
    fn grade_answers() {
        let ex = Exercise {
            id: 7,
            lesson_id: 2,
            question: "I ___ to school yesterday.".to_owned(),
            kind: ExerciseKind::FillInTheBlank,
            options: None,
            answer: "went".to_owned(),
        };

        let p = Progress::grade(3, &ex, " Went ");
        assert_eq!((p.student_id, p.exercise_id), (3, 7));
        assert!(p.passed());
        assert_eq!(p.answer.as_deref(), Some("Went"));

        let p = Progress::grade(3, &ex, "goed");
        assert_eq!(p.score, Some(0));
        assert!(!p.passed());
    }
}
