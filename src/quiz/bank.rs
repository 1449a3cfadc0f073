use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

use crate::quiz::Question;

/// Every question offers the same fixed number of choices.
pub const OPTIONS_PER_QUESTION: usize = 4;

#[derive(Debug, Error)]
pub enum BankError {
    #[error("the question bank contains no questions")]
    Empty,
    #[error("question id {id} is used more than once")]
    DuplicateId { id: u32 },
    #[error("question {id} must offer exactly 4 options, found {found}")]
    WrongOptionCount { id: u32, found: usize },
    #[error("question {id} lists the option \"{option}\" twice")]
    DuplicateOption { id: u32, option: String },
    #[error("question {id} has a correct answer that is not one of its options")]
    CorrectAnswerMissing { id: u32 },
    #[error("failed to read the question bank file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse the question bank file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The full set of questions for one quiz, plus the title and description
/// shown on the start screen. A bank never changes once loaded.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QuestionBank {
    pub title: String,
    pub description: String,
    pub questions: Vec<Question>,
}

impl QuestionBank {
    pub fn new(
        title: String,
        description: String,
        questions: Vec<Question>,
    ) -> Result<Self, BankError> {
        let bank = Self {
            title,
            description,
            questions,
        };
        bank.validate()?;
        Ok(bank)
    }

    /// The stock general-knowledge quiz shipped with the bot.
    pub fn builtin() -> Result<Self, BankError> {
        Self::new(
            "General Knowledge Quiz".to_string(),
            "Test your knowledge with these 5 questions. You have 1 minute per question!"
                .to_string(),
            vec![
                question(
                    1,
                    "What is the capital of France?",
                    ["London", "Berlin", "Paris", "Madrid"],
                    "Paris",
                ),
                question(
                    2,
                    "Which planet is known as the Red Planet?",
                    ["Venus", "Mars", "Jupiter", "Saturn"],
                    "Mars",
                ),
                question(
                    3,
                    "What is the largest mammal in the world?",
                    ["African Elephant", "Blue Whale", "Giraffe", "Hippopotamus"],
                    "Blue Whale",
                ),
                question(
                    4,
                    "Who painted the Mona Lisa?",
                    [
                        "Vincent van Gogh",
                        "Pablo Picasso",
                        "Leonardo da Vinci",
                        "Michelangelo",
                    ],
                    "Leonardo da Vinci",
                ),
                question(
                    5,
                    "What is the chemical symbol for gold?",
                    ["Ag", "Fe", "Au", "Cu"],
                    "Au",
                ),
            ],
        )
    }

    /// Loads a bank from a JSON file with the same shape as the built-in
    /// data: `{ "title", "description", "questions": [{ "id", "prompt",
    /// "options", "correctAnswer" }] }`.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, BankError> {
        let raw = std::fs::read_to_string(path)?;
        let bank: Self = serde_json::from_str(&raw)?;
        bank.validate()?;
        Ok(bank)
    }

    /// A malformed bank must never reach the engine, so every loading path
    /// runs this before handing the bank out.
    pub fn validate(&self) -> Result<(), BankError> {
        if self.questions.is_empty() {
            return Err(BankError::Empty);
        }

        let mut seen_ids = HashSet::new();
        for question in &self.questions {
            if !seen_ids.insert(question.id) {
                return Err(BankError::DuplicateId { id: question.id });
            }
            if question.options.len() != OPTIONS_PER_QUESTION {
                return Err(BankError::WrongOptionCount {
                    id: question.id,
                    found: question.options.len(),
                });
            }
            let mut seen_options = HashSet::new();
            for option in &question.options {
                if !seen_options.insert(option.as_str()) {
                    return Err(BankError::DuplicateOption {
                        id: question.id,
                        option: option.clone(),
                    });
                }
            }
            if !question.options.contains(&question.correct_answer) {
                return Err(BankError::CorrectAnswerMissing { id: question.id });
            }
        }
        Ok(())
    }
}

pub(crate) fn question(
    id: u32,
    prompt: &str,
    options: [&str; OPTIONS_PER_QUESTION],
    correct_answer: &str,
) -> Question {
    Question {
        id,
        prompt: prompt.to_string(),
        options: options.iter().map(|option| option.to_string()).collect(),
        correct_answer: correct_answer.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_builtin_bank_passes_validation() {
        let bank = QuestionBank::builtin().unwrap();
        assert_eq!(bank.questions.len(), 5);
        assert_eq!(bank.title, "General Knowledge Quiz");
    }

    #[test]
    fn an_empty_bank_is_rejected() {
        let err = QuestionBank::new("T".to_string(), "D".to_string(), Vec::new()).unwrap_err();
        assert!(matches!(err, BankError::Empty));
    }

    #[test]
    fn duplicate_question_ids_are_rejected() {
        let err = QuestionBank::new(
            "T".to_string(),
            "D".to_string(),
            vec![
                question(7, "One?", ["a", "b", "c", "d"], "a"),
                question(7, "Two?", ["e", "f", "g", "h"], "e"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, BankError::DuplicateId { id: 7 }));
    }

    #[test]
    fn a_question_must_offer_exactly_four_options() {
        let mut short = question(1, "One?", ["a", "b", "c", "d"], "a");
        short.options.pop();
        let err = QuestionBank::new("T".to_string(), "D".to_string(), vec![short]).unwrap_err();
        assert!(matches!(err, BankError::WrongOptionCount { id: 1, found: 3 }));
    }

    #[test]
    fn duplicate_options_are_rejected() {
        let err = QuestionBank::new(
            "T".to_string(),
            "D".to_string(),
            vec![question(1, "One?", ["a", "a", "c", "d"], "a")],
        )
        .unwrap_err();
        assert!(matches!(err, BankError::DuplicateOption { id: 1, .. }));
    }

    #[test]
    fn the_correct_answer_must_be_one_of_the_options() {
        let err = QuestionBank::new(
            "T".to_string(),
            "D".to_string(),
            vec![question(1, "One?", ["a", "b", "c", "d"], "z")],
        )
        .unwrap_err();
        assert!(matches!(err, BankError::CorrectAnswerMissing { id: 1 }));
    }

    #[test]
    fn a_bank_parses_from_the_json_shape() {
        let raw = r#"{
            "title": "T",
            "description": "D",
            "questions": [
                { "id": 1, "prompt": "Q?", "options": ["a", "b", "c", "d"], "correctAnswer": "a" }
            ]
        }"#;
        let bank: QuestionBank = serde_json::from_str(raw).unwrap();
        bank.validate().unwrap();
        assert_eq!(bank.questions[0].correct_answer, "a");
    }
}
