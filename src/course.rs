/*!
Course material: `Level`s, `Lesson`s and the `Exercise`s in them.
*/
use serde::Serialize;

/// A named proficiency tier.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Level {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Lesson {
    pub id: i64,
    pub teacher_id: i64,
    pub title: String,
    pub content: String,
    /// URL of an accompanying video.
    pub video: Option<String>,
    pub level_id: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    MultipleChoice,
    FillInTheBlank,
    ShortAnswer,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 3] = [
        ExerciseKind::MultipleChoice,
        ExerciseKind::FillInTheBlank,
        ExerciseKind::ShortAnswer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseKind::MultipleChoice => "multiple_choice",
            ExerciseKind::FillInTheBlank => "fill_in_the_blank",
            ExerciseKind::ShortAnswer    => "short_answer",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExerciseKind::MultipleChoice => "Multiple choice",
            ExerciseKind::FillInTheBlank => "Fill in the blank",
            ExerciseKind::ShortAnswer    => "Short answer",
        }
    }
}

impl std::fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExerciseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "multiple_choice"   => Ok(ExerciseKind::MultipleChoice),
            "fill_in_the_blank" => Ok(ExerciseKind::FillInTheBlank),
            "short_answer"      => Ok(ExerciseKind::ShortAnswer),
            _ => Err(format!("{:?} is not a valid exercise type.", s)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Exercise {
    pub id: i64,
    pub lesson_id: i64,
    pub question: String,
    pub kind: ExerciseKind,
    /// Comma-separated choices, for multiple choice questions.
    pub options: Option<String>,
    pub answer: String,
}

impl Exercise {
    /// The individual choices from `options`, trimmed, blanks dropped.
    pub fn choices(&self) -> Vec<&str> {
        match &self.options {
            None => Vec::new(),
            Some(opts) => opts.split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Whether `response` counts as the correct answer.
    ///
    /// Comparison ignores surrounding whitespace and case.
    pub fn is_correct(&self, response: &str) -> bool {
        response.trim().to_lowercase() == self.answer.trim().to_lowercase()
    }
}
