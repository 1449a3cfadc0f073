pub mod bank;
pub mod engine;
pub mod timer;

/// One multiple-choice question. The `correct_answer` is always one of the
/// `options`; the bank checks that at load time.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: u32,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

/// What the user did with one question. `selected` is `None` when the
/// countdown ran out before they picked anything.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRecord {
    pub prompt: String,
    pub selected: Option<String>,
    pub correct_answer: String,
    pub is_correct: bool,
}
