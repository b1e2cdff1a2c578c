//! Pure scoring of an attempt.
//!
//! `grade` has no side effects and iterates questions in exam order with
//! ordered maps, so identical inputs always produce identical breakdowns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{Answer, Question, QuestionId, QuestionKind, Subject};

/// Outcome of one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Correct,
    Wrong,
    Unattempted,
}

/// Per-subject aggregate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubjectScore {
    /// Correctly answered questions in this subject.
    pub correct: usize,
    /// All questions in this subject, attempted or not.
    pub total: usize,
    /// Net marks (negative marking included).
    pub marks: f64,
}

/// Grading detail for a single question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionGrade {
    pub question_id: QuestionId,
    pub subject: Subject,
    pub verdict: Verdict,
    pub awarded: f64,
}

/// Everything `grade` computes.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub total_questions: usize,
    pub correct: usize,
    pub wrong: usize,
    pub unattempted: usize,
    pub total_marks: f64,
    pub obtained_marks: f64,
    pub subject_wise: BTreeMap<Subject, SubjectScore>,
    pub questions: Vec<QuestionGrade>,
}

impl ScoreBreakdown {
    /// `obtained / total * 100`, or 0 when the exam is worth no marks.
    ///
    /// Not clamped: heavy negative marking yields a negative percentage.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        percentage(self.obtained_marks, self.total_marks)
    }
}

pub(crate) fn percentage(obtained: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        obtained / total * 100.0
    }
}

/// Whether `answer` is correct for `question`.
///
/// Single-choice compares strings exactly, numeric compares trimmed strings
/// without numeric coercion, multi-choice requires the exact set. An answer
/// of the wrong shape is never correct.
#[must_use]
pub fn is_correct(question: &Question, answer: &Answer) -> bool {
    match (question.kind(), question.correct_answer(), answer) {
        (QuestionKind::SingleChoice, Answer::Single(expected), Answer::Single(given)) => {
            given == expected
        }
        (QuestionKind::Numeric, Answer::Single(expected), Answer::Single(given)) => {
            given.trim() == expected.trim()
        }
        (QuestionKind::MultiChoice, Answer::Multiple(expected), Answer::Multiple(given)) => {
            given == expected
        }
        _ => false,
    }
}

/// Grade `answers` against `questions`.
///
/// A question without an entry in `answers` is unattempted and scores 0.
/// A correct answer earns `marks`, a wrong one loses `negative_marks`.
/// Entries for ids not in `questions` are ignored.
#[must_use]
pub fn grade(questions: &[Question], answers: &BTreeMap<QuestionId, Answer>) -> ScoreBreakdown {
    let mut breakdown = ScoreBreakdown {
        total_questions: questions.len(),
        correct: 0,
        wrong: 0,
        unattempted: 0,
        total_marks: 0.0,
        obtained_marks: 0.0,
        subject_wise: BTreeMap::new(),
        questions: Vec::with_capacity(questions.len()),
    };

    for question in questions {
        breakdown.total_marks += question.marks();

        let (verdict, awarded) = match answers.get(question.id()) {
            None => (Verdict::Unattempted, 0.0),
            Some(answer) if is_correct(question, answer) => (Verdict::Correct, question.marks()),
            Some(_) => (Verdict::Wrong, -question.negative_marks()),
        };

        match verdict {
            Verdict::Correct => breakdown.correct += 1,
            Verdict::Wrong => breakdown.wrong += 1,
            Verdict::Unattempted => breakdown.unattempted += 1,
        }
        breakdown.obtained_marks += awarded;

        let subject = breakdown
            .subject_wise
            .entry(question.subject().clone())
            .or_default();
        subject.total += 1;
        subject.marks += awarded;
        if verdict == Verdict::Correct {
            subject.correct += 1;
        }

        breakdown.questions.push(QuestionGrade {
            question_id: question.id().clone(),
            subject: question.subject().clone(),
            verdict,
            awarded,
        });
    }

    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionDraft;

    fn single(id: &str, correct: &str, marks: f64, negative: f64, subject: &str) -> Question {
        QuestionDraft {
            id: id.into(),
            kind: QuestionKind::SingleChoice,
            prompt: String::new(),
            options: ["A", "B", "C", "X"].iter().map(|s| (*s).to_owned()).collect(),
            correct_answer: Answer::single(correct),
            marks,
            negative_marks: negative,
            subject: Subject::new(subject),
        }
        .validate()
        .unwrap()
    }

    fn multi(id: &str, correct: &[&str]) -> Question {
        QuestionDraft {
            id: id.into(),
            kind: QuestionKind::MultiChoice,
            prompt: String::new(),
            options: ["A", "B", "C", "D"].iter().map(|s| (*s).to_owned()).collect(),
            correct_answer: Answer::multiple(correct.iter().copied()),
            marks: 4.0,
            negative_marks: 2.0,
            subject: Subject::new("chemistry"),
        }
        .validate()
        .unwrap()
    }

    fn numeric(id: &str, correct: &str) -> Question {
        QuestionDraft {
            id: id.into(),
            kind: QuestionKind::Numeric,
            prompt: String::new(),
            options: Vec::new(),
            correct_answer: Answer::single(correct),
            marks: 4.0,
            negative_marks: 0.0,
            subject: Subject::new("physics"),
        }
        .validate()
        .unwrap()
    }

    fn qid(id: &str) -> QuestionId {
        QuestionId::new(id).unwrap()
    }

    #[test]
    fn negative_marking_and_unattempted() {
        let questions = vec![
            single("q1", "A", 4.0, 1.0, "maths"),
            single("q2", "B", 4.0, 1.0, "maths"),
            single("q3", "C", 4.0, 1.0, "maths"),
        ];
        let mut answers = BTreeMap::new();
        answers.insert(qid("q1"), Answer::single("A"));
        answers.insert(qid("q2"), Answer::single("X"));

        let b = grade(&questions, &answers);
        assert_eq!((b.correct, b.wrong, b.unattempted), (1, 1, 1));
        assert!((b.obtained_marks - 3.0).abs() < f64::EPSILON);
        assert!((b.total_marks - 12.0).abs() < f64::EPSILON);
        assert!((b.percentage() - 25.0).abs() < f64::EPSILON);
        assert_eq!(
            b.questions.iter().map(|q| q.verdict).collect::<Vec<_>>(),
            vec![Verdict::Correct, Verdict::Wrong, Verdict::Unattempted]
        );
    }

    #[test]
    fn multi_choice_subset_is_wrong() {
        let questions = vec![multi("q1", &["A", "C"])];
        let mut answers = BTreeMap::new();
        answers.insert(qid("q1"), Answer::multiple(["A"]));
        let b = grade(&questions, &answers);
        assert_eq!(b.wrong, 1);
        assert!((b.obtained_marks + 2.0).abs() < f64::EPSILON);

        answers.insert(qid("q1"), Answer::multiple(["A", "B", "C"]));
        assert_eq!(grade(&questions, &answers).wrong, 1);

        answers.insert(qid("q1"), Answer::multiple(["C", "A"]));
        assert_eq!(grade(&questions, &answers).correct, 1);
    }

    #[test]
    fn numeric_compares_trimmed_strings_only() {
        let questions = vec![numeric("q1", "2.50")];
        let mut answers = BTreeMap::new();
        answers.insert(qid("q1"), Answer::single(" 2.50 "));
        assert_eq!(grade(&questions, &answers).correct, 1);

        answers.insert(qid("q1"), Answer::single("2.5"));
        assert_eq!(grade(&questions, &answers).wrong, 1);
    }

    #[test]
    fn all_unattempted_scores_zero() {
        let questions = vec![
            single("q1", "A", 4.0, 1.0, "maths"),
            single("q2", "B", 4.0, 1.0, "physics"),
        ];
        let b = grade(&questions, &BTreeMap::new());
        assert_eq!(b.unattempted, 2);
        assert_eq!(b.correct, 0);
        assert_eq!(b.obtained_marks, 0.0);
        assert_eq!(b.percentage(), 0.0);
    }

    #[test]
    fn zero_mark_question_still_counts_as_correct() {
        let questions = vec![single("q1", "A", 0.0, 0.0, "maths")];
        let mut answers = BTreeMap::new();
        answers.insert(qid("q1"), Answer::single("A"));
        let b = grade(&questions, &answers);
        assert_eq!(b.correct, 1);
        assert_eq!(b.obtained_marks, 0.0);
        assert_eq!(b.percentage(), 0.0);
    }

    #[test]
    fn score_can_go_negative() {
        let questions = vec![single("q1", "A", 1.0, 3.0, "maths")];
        let mut answers = BTreeMap::new();
        answers.insert(qid("q1"), Answer::single("B"));
        let b = grade(&questions, &answers);
        assert!((b.obtained_marks + 3.0).abs() < f64::EPSILON);
        assert!((b.percentage() + 300.0).abs() < 1e-9);
    }

    #[test]
    fn subject_wise_aggregation() {
        let questions = vec![
            single("q1", "A", 4.0, 1.0, "maths"),
            single("q2", "A", 4.0, 1.0, "physics"),
            single("q3", "A", 4.0, 1.0, "maths"),
        ];
        let mut answers = BTreeMap::new();
        answers.insert(qid("q1"), Answer::single("A"));
        answers.insert(qid("q2"), Answer::single("B"));
        answers.insert(qid("q3"), Answer::single("A"));

        let b = grade(&questions, &answers);
        let maths = &b.subject_wise[&Subject::new("maths")];
        assert_eq!((maths.correct, maths.total), (2, 2));
        assert!((maths.marks - 8.0).abs() < f64::EPSILON);
        let physics = &b.subject_wise[&Subject::new("physics")];
        assert_eq!((physics.correct, physics.total), (0, 1));
        assert!((physics.marks + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn wrong_shape_grades_as_wrong() {
        let questions = vec![single("q1", "A", 4.0, 1.0, "maths")];
        let mut answers = BTreeMap::new();
        answers.insert(qid("q1"), Answer::multiple(["A"]));
        assert_eq!(grade(&questions, &answers).wrong, 1);
    }

    #[test]
    fn grading_is_deterministic() {
        let questions = vec![
            single("q1", "A", 4.0, 1.0, "maths"),
            multi("q2", &["A", "D"]),
            numeric("q3", "7"),
        ];
        let mut answers = BTreeMap::new();
        answers.insert(qid("q3"), Answer::single("7"));
        answers.insert(qid("q2"), Answer::multiple(["D", "A"]));
        answers.insert(qid("q1"), Answer::single("C"));

        let first = grade(&questions, &answers);
        let second = grade(&questions, &answers);
        assert_eq!(first, second);
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
        assert_eq!(first.correct + first.wrong + first.unattempted, 3);
    }
}
