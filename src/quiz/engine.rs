use crate::quiz::bank::QuestionBank;
use crate::quiz::{AnswerRecord, Question};

/// Returned when an engine call arrives outside the state it needs, for
/// example an answer after the countdown already resolved the question.
/// Callers log it and move on; the session is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {op} while the quiz is {phase}")]
pub struct InvalidOperation {
    op: &'static str,
    phase: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotStarted,
    ShowingQuestion,
    Feedback,
    Complete,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::NotStarted => "not started",
            Phase::ShowingQuestion => "showing a question",
            Phase::Feedback => "showing feedback",
            Phase::Complete => "complete",
        }
    }
}

/// Everything that changes while one quiz run is played. A session is
/// created by `start()`, replaced wholesale by `reset()`, and only ever
/// mutated by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuizSession {
    pub current_index: usize,
    pub score: u32,
    pub answer_log: Vec<AnswerRecord>,
}

/// What the engine tells the renderer. The renderer turns these into
/// messages; the engine never knows what a message is.
#[derive(Debug, Clone, PartialEq)]
pub enum QuizEvent {
    QuestionShown {
        index: usize,
        total: usize,
        prompt: String,
        options: Vec<String>,
    },
    AnswerFeedback {
        selected: Option<String>,
        correct_answer: String,
        is_correct: bool,
    },
    QuizComplete {
        score: u32,
        total: usize,
        answer_log: Vec<AnswerRecord>,
    },
}

/// The quiz state machine. Phases move NotStarted -> ShowingQuestion ->
/// Feedback -> ShowingQuestion ... -> Complete, and `reset()` rewinds to
/// NotStarted from anywhere. Scoring: +1 for a correct answer, -1 (never
/// below zero) for a wrong or timed-out one.
#[derive(Debug, Clone)]
pub struct QuizEngine {
    bank: QuestionBank,
    phase: Phase,
    session: QuizSession,
}

impl QuizEngine {
    /// The bank must already have passed validation; see `QuestionBank`.
    pub fn new(bank: QuestionBank) -> Self {
        Self {
            bank,
            phase: Phase::NotStarted,
            session: QuizSession::default(),
        }
    }

    /// Begins a fresh run. Only valid before the first question or after
    /// completion; a run in progress has to be `reset()` first.
    pub fn start(&mut self) -> Result<QuizEvent, InvalidOperation> {
        match self.phase {
            Phase::NotStarted | Phase::Complete => {}
            Phase::ShowingQuestion | Phase::Feedback => return Err(self.invalid("start")),
        }
        self.session = QuizSession::default();
        self.phase = Phase::ShowingQuestion;
        Ok(self.question_shown())
    }

    /// Resolves the current question with the user's pick. Any text is
    /// accepted; whether it matters is decided purely by comparison with
    /// the correct answer.
    pub fn submit_answer(&mut self, selected: &str) -> Result<QuizEvent, InvalidOperation> {
        if self.phase != Phase::ShowingQuestion {
            return Err(self.invalid("submit an answer"));
        }
        Ok(self.resolve(Some(selected.to_string())))
    }

    /// Resolves the current question as unanswered. The caller passes the
    /// index its countdown was armed for, so an expiry that lost the race
    /// against an answer is rejected instead of resolving the wrong
    /// question.
    pub fn expire(&mut self, index: usize) -> Result<QuizEvent, InvalidOperation> {
        if self.phase != Phase::ShowingQuestion || self.session.current_index != index {
            return Err(self.invalid("expire the countdown"));
        }
        Ok(self.resolve(None))
    }

    /// Leaves the feedback phase: either the next question or completion.
    /// The renderer calls this once its feedback delay has passed.
    pub fn advance(&mut self) -> Result<QuizEvent, InvalidOperation> {
        if self.phase != Phase::Feedback {
            return Err(self.invalid("advance"));
        }
        if self.session.current_index < self.bank.questions.len() {
            self.phase = Phase::ShowingQuestion;
            Ok(self.question_shown())
        } else {
            self.phase = Phase::Complete;
            Ok(QuizEvent::QuizComplete {
                score: self.session.score,
                total: self.bank.questions.len(),
                answer_log: self.session.answer_log.clone(),
            })
        }
    }

    /// Throws the session away. Valid in every phase.
    pub fn reset(&mut self) {
        self.phase = Phase::NotStarted;
        self.session = QuizSession::default();
    }

    /// The question currently waiting for an answer, if any.
    pub fn current_question(&self) -> Option<&Question> {
        match self.phase {
            Phase::ShowingQuestion => self.bank.questions.get(self.session.current_index),
            _ => None,
        }
    }

    pub fn session(&self) -> &QuizSession {
        &self.session
    }

    // The one place the scoring rule lives. Appending the record and
    // bumping the index happen in the same step, which keeps
    // answer_log.len() == current_index across every transition.
    fn resolve(&mut self, selected: Option<String>) -> QuizEvent {
        let question = self.bank.questions[self.session.current_index].clone();
        let is_correct = selected.as_deref() == Some(question.correct_answer.as_str());
        if is_correct {
            self.session.score += 1;
        } else {
            self.session.score = self.session.score.saturating_sub(1);
        }
        self.session.answer_log.push(AnswerRecord {
            prompt: question.prompt,
            selected: selected.clone(),
            correct_answer: question.correct_answer.clone(),
            is_correct,
        });
        self.session.current_index += 1;
        self.phase = Phase::Feedback;
        QuizEvent::AnswerFeedback {
            selected,
            correct_answer: question.correct_answer,
            is_correct,
        }
    }

    fn question_shown(&self) -> QuizEvent {
        let question = &self.bank.questions[self.session.current_index];
        QuizEvent::QuestionShown {
            index: self.session.current_index,
            total: self.bank.questions.len(),
            prompt: question.prompt.clone(),
            options: question.options.clone(),
        }
    }

    fn invalid(&self, op: &'static str) -> InvalidOperation {
        InvalidOperation {
            op,
            phase: self.phase.name(),
        }
    }
}
