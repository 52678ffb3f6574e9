//! Quiz scoring.

use serde::{Deserialize, Serialize};

use crate::course::QuizQuestion;
use crate::error::{Result, TutorError};

/// The result of grading one quiz submission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    /// Number of correctly answered questions.
    pub correct: usize,
    /// Number of questions in the quiz.
    pub total: usize,
    /// Score as a percentage (0–100), unrounded.
    pub percent: f64,
    /// Whether the score reaches the passing threshold.
    pub passed: bool,
}

/// Grades `answers` against `questions`.
///
/// `answers[i]` is the zero-based option chosen for `questions[i]`. Every
/// question must be answered.
///
/// # Errors
///
/// Returns `TutorError::IncompleteAnswers` when the number of answers does
/// not match the number of questions, and `TutorError::InvalidAnswer` when an
/// answer is negative or past the question's last option.
#[allow(clippy::cast_precision_loss)]
pub fn score(questions: &[QuizQuestion], answers: &[i64], passing_score: f64) -> Result<QuizResult> {
    if answers.len() != questions.len() {
        return Err(TutorError::IncompleteAnswers {
            answered: answers.len(),
            expected: questions.len(),
        });
    }

    if let Some((idx, (question, &answer))) = questions
        .iter()
        .zip(answers)
        .enumerate()
        .find(|(_, (question, &answer))| !question.is_valid_choice(answer))
    {
        return Err(TutorError::InvalidAnswer {
            question: idx + 1,
            answer,
            options: question.options.len(),
        });
    }

    let correct = questions
        .iter()
        .zip(answers)
        .filter(|(question, &answer)| question.is_correct(answer))
        .count();
    let total = questions.len();
    let percent = if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    };

    Ok(QuizResult {
        correct,
        total,
        percent,
        passed: percent >= passing_score,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn question(correct_answer: i64) -> QuizQuestion {
        QuizQuestion {
            question: "?".to_string(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer,
            explanation: None,
        }
    }

    #[test]
    fn test_two_of_three_passes() {
        let questions = [question(1), question(0), question(2)];
        let result = score(&questions, &[1, 1, 2], 60.0).unwrap();

        assert_eq!(result.correct, 2);
        assert_eq!(result.total, 3);
        assert!((result.percent - 66.666_666).abs() < 0.001);
        assert!(result.passed);
    }

    #[test]
    fn test_half_fails() {
        let questions = [question(0), question(1), question(2), question(3)];
        let result = score(&questions, &[0, 1, 0, 0], 60.0).unwrap();

        assert_eq!(result.correct, 2);
        assert!((result.percent - 50.0).abs() < f64::EPSILON);
        assert!(!result.passed);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let questions = [question(0), question(0), question(0), question(0), question(0)];
        let result = score(&questions, &[0, 0, 0, 1, 1], 60.0).unwrap();
        assert!(result.passed);
    }

    #[test]
    fn test_incomplete_answers_rejected() {
        let questions = [question(0), question(1)];
        let err = score(&questions, &[0], 60.0).unwrap_err();
        assert!(matches!(
            err,
            TutorError::IncompleteAnswers {
                answered: 1,
                expected: 2
            }
        ));
    }

    #[test]
    fn test_answering_out_of_range_correct_answer_is_rejected() {
        let mut broken = question(9);
        broken.options.truncate(2);

        let err = score(&[broken.clone()], &[9], 60.0).unwrap_err();
        assert!(matches!(
            err,
            TutorError::InvalidAnswer {
                question: 1,
                answer: 9,
                options: 2
            }
        ));

        // A valid choice on the same question still scores zero
        let result = score(&[broken], &[1], 60.0).unwrap();
        assert_eq!(result.correct, 0);
        assert!(!result.passed);
    }

    #[test]
    fn test_negative_answer_rejected() {
        let questions = [question(0), question(1)];
        let err = score(&questions, &[0, -1], 60.0).unwrap_err();
        assert!(matches!(
            err,
            TutorError::InvalidAnswer {
                question: 2,
                answer: -1,
                ..
            }
        ));
    }
}
