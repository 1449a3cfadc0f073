mod quiz;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dotenv::dotenv;
use teloxide::{
    dispatching::dialogue::InMemStorage,
    prelude::*,
    types::{ChatId, KeyboardButton, KeyboardMarkup, ParseMode},
};

use quiz::bank::QuestionBank;
use quiz::engine::{QuizEngine, QuizEvent};
use quiz::timer::{QuestionTimer, TimerFuture, QUESTION_TIME_SECS};
use quiz::AnswerRecord;

type QuizDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// How long the feedback message stays on screen before the next question.
const FEEDBACK_DELAY: Duration = Duration::from_millis(1500);

const START_QUIZ: &str = "Start Quiz";
const RESTART_QUIZ: &str = "Restart Quiz";

#[derive(Clone, Default)]
pub enum State {
    #[default]
    Start,
    ReceiveQuizStart,
    AnswerQuestion {
        engine: QuizEngine,
    },
    ReceiveRestart {
        engine: QuizEngine,
    },
}

/// Per-chat runtime bookkeeping: the armed countdown, and the gate that
/// serializes the answer path against the expiry path so only one of them
/// can resolve a question.
#[derive(Clone, Default)]
struct ActiveChats {
    timers: Arc<Mutex<HashMap<ChatId, QuestionTimer>>>,
    gates: Arc<Mutex<HashMap<ChatId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ActiveChats {
    fn arm(&self, chat_id: ChatId, timer: QuestionTimer) {
        // Dropping the previous entry cancels its countdown.
        self.timers
            .lock()
            .expect("timer registry poisoned")
            .insert(chat_id, timer);
    }

    fn disarm(&self, chat_id: ChatId) {
        self.timers
            .lock()
            .expect("timer registry poisoned")
            .remove(&chat_id);
    }

    fn gate(&self, chat_id: ChatId) -> Arc<tokio::sync::Mutex<()>> {
        self.gates
            .lock()
            .expect("gate registry poisoned")
            .entry(chat_id)
            .or_default()
            .clone()
    }
}

#[tokio::main]
async fn main() {
    dotenv().expect("Failed to load .env file");

    pretty_env_logger::init();
    log::info!("Starting quiz bot...");

    let bot = Bot::from_env();

    println!("Loading the question bank...");
    let bank = match std::env::var("QUIZ_FILE") {
        Ok(path) => QuestionBank::from_json_file(path).expect("Failed to load the question bank"),
        Err(_) => QuestionBank::builtin().expect("the built-in question bank is valid"),
    };
    println!(
        "Question bank ready: \"{}\", {} questions",
        bank.title,
        bank.questions.len()
    );

    let time_limit = std::env::var("QUESTION_TIME_SECS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(QUESTION_TIME_SECS);

    let chats = ActiveChats::default();

    let bank_for_greeting = bank.clone();
    let bank_for_start = bank;
    let chats_for_start = chats.clone();
    let chats_for_answers = chats.clone();
    let chats_for_restart = chats;

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, InMemStorage<State>, State>()
            .branch(dptree::case![State::Start].endpoint(
                move |bot: Bot, dialogue: QuizDialogue, msg: Message| {
                    start(bank_for_greeting.clone(), bot, dialogue, msg)
                },
            ))
            .branch(dptree::case![State::ReceiveQuizStart].endpoint(
                move |bot: Bot, dialogue: QuizDialogue, msg: Message| {
                    receive_quiz_start(
                        bank_for_start.clone(),
                        chats_for_start.clone(),
                        time_limit,
                        bot,
                        dialogue,
                        msg,
                    )
                },
            ))
            .branch(dptree::case![State::AnswerQuestion { engine }].endpoint(
                move |bot: Bot, dialogue: QuizDialogue, msg: Message| {
                    answer_question(chats_for_answers.clone(), time_limit, bot, dialogue, msg)
                },
            ))
            .branch(dptree::case![State::ReceiveRestart { engine }].endpoint(
                move |bot: Bot, dialogue: QuizDialogue, msg: Message| {
                    receive_restart(chats_for_restart.clone(), time_limit, bot, dialogue, msg)
                },
            )),
    )
    .dependencies(dptree::deps![InMemStorage::<State>::new()])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

async fn start(
    bank: QuestionBank,
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
) -> HandlerResult {
    let keyboard = KeyboardMarkup::new(vec![vec![KeyboardButton::new(START_QUIZ)]]);
    bot.send_message(
        msg.chat.id,
        format!("<b>{}</b>\n\n{}", bank.title, bank.description),
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(keyboard)
    .await?;

    dialogue.update(State::ReceiveQuizStart).await?;
    Ok(())
}

async fn receive_quiz_start(
    bank: QuestionBank,
    chats: ActiveChats,
    time_limit: u32,
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
) -> HandlerResult {
    match msg.text() {
        Some(START_QUIZ) => {
            let gate = chats.gate(msg.chat.id);
            let _resolving = gate.lock().await;

            let mut engine = QuizEngine::new(bank);
            match engine.start() {
                Ok(shown) => {
                    show_question(chats.clone(), time_limit, bot, dialogue, msg.chat.id, engine, shown)
                        .await
                }
                Err(err) => {
                    log::error!("failed to start a quiz for chat {}: {}", msg.chat.id, err);
                    Ok(())
                }
            }
        }
        _ => {
            bot.send_message(
                msg.chat.id,
                format!("Press \"{}\" when you are ready!", START_QUIZ),
            )
            .await?;
            Ok(())
        }
    }
}

async fn answer_question(
    chats: ActiveChats,
    time_limit: u32,
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let selected = match msg.text() {
        Some(text) => text.to_string(),
        None => {
            bot.send_message(chat_id, "Please use the answer buttons")
                .await?;
            return Ok(());
        }
    };

    // The expiry path takes the same gate, so whichever of the two gets
    // here first resolves the question and the loser becomes a no-op.
    let gate = chats.gate(chat_id);
    let _resolving = gate.lock().await;

    // Re-read the dialogue: the countdown may have resolved this question
    // while the message was waiting for the gate.
    let mut engine = match dialogue.get().await? {
        Some(State::AnswerQuestion { engine }) => engine,
        _ => return Ok(()),
    };

    let is_option = engine
        .current_question()
        .map(|question| question.options.iter().any(|option| option == &selected))
        .unwrap_or(false);
    if !is_option {
        bot.send_message(chat_id, "Please pick one of the answer options")
            .await?;
        return Ok(());
    }

    // The countdown must be cancelled before the session is touched.
    chats.disarm(chat_id);
    match engine.submit_answer(&selected) {
        Ok(feedback) => {
            resolve_question(chats.clone(), time_limit, bot, dialogue, chat_id, engine, feedback)
                .await
        }
        Err(err) => {
            log::debug!("ignoring an answer from chat {}: {}", chat_id, err);
            Ok(())
        }
    }
}

async fn receive_restart(
    chats: ActiveChats,
    time_limit: u32,
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
) -> HandlerResult {
    match msg.text() {
        Some(RESTART_QUIZ) => {
            let gate = chats.gate(msg.chat.id);
            let _resolving = gate.lock().await;

            let mut engine = match dialogue.get().await? {
                Some(State::ReceiveRestart { engine }) => engine,
                _ => return Ok(()),
            };
            engine.reset();
            match engine.start() {
                Ok(shown) => {
                    show_question(chats.clone(), time_limit, bot, dialogue, msg.chat.id, engine, shown)
                        .await
                }
                Err(err) => {
                    log::error!("failed to restart the quiz for chat {}: {}", msg.chat.id, err);
                    Ok(())
                }
            }
        }
        _ => {
            bot.send_message(
                msg.chat.id,
                format!("Press \"{}\" to play again!", RESTART_QUIZ),
            )
            .await?;
            Ok(())
        }
    }
}

/// Renders a freshly shown question, arms its countdown, and stores the
/// engine back into the dialogue.
// Returns an explicitly boxed `Send` future rather than an `async fn`'s
// opaque `impl Future`: show_question, resolve_question and handle_timeout
// are mutually recursive (via the timer's on_expire callback), and the
// `Send` auto-trait cannot be inferred across that cycle. Declaring the
// `Send` bound here breaks the cycle without changing behavior.
fn show_question(
    chats: ActiveChats,
    time_limit: u32,
    bot: Bot,
    dialogue: QuizDialogue,
    chat_id: ChatId,
    engine: QuizEngine,
    shown: QuizEvent,
) -> Pin<Box<dyn std::future::Future<Output = HandlerResult> + Send>> {
    Box::pin(async move {
    let (index, total, prompt, options) = match shown {
        QuizEvent::QuestionShown {
            index,
            total,
            prompt,
            options,
        } => (index, total, prompt, options),
        _ => return Ok(()),
    };

    let keyboard = KeyboardMarkup::new(
        options
            .iter()
            .map(|option| vec![KeyboardButton::new(option.clone())])
            .collect::<Vec<_>>(),
    );
    bot.send_message(
        chat_id,
        format!("<b>Question {} of {}</b>\n\n{}", index + 1, total, prompt),
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(keyboard)
    .await?;

    let countdown = bot
        .send_message(
            chat_id,
            format!("⏳ Time left: {}", fmt_remaining(time_limit)),
        )
        .await?;

    let on_tick = {
        let bot = bot.clone();
        let countdown_id = countdown.id;
        move |remaining: u32| -> TimerFuture {
            let bot = bot.clone();
            Box::pin(async move {
                // Telegram throttles message edits, so the countdown only
                // redraws every ten seconds until the final stretch.
                if remaining == time_limit || (remaining > 10 && remaining % 10 != 0) {
                    return;
                }
                let text = if remaining <= 10 {
                    format!("⏳ Time left: <b>{}</b>", fmt_remaining(remaining))
                } else {
                    format!("⏳ Time left: {}", fmt_remaining(remaining))
                };
                if let Err(err) = bot
                    .edit_message_text(chat_id, countdown_id, text)
                    .parse_mode(ParseMode::Html)
                    .await
                {
                    log::debug!("countdown update failed for chat {}: {}", chat_id, err);
                }
            })
        }
    };

    let on_expire = {
        let bot = bot.clone();
        let dialogue = dialogue.clone();
        let chats = chats.clone();
        move || -> TimerFuture {
            Box::pin(async move {
                if let Err(err) =
                    handle_timeout(chats, time_limit, bot, dialogue, chat_id, index).await
                {
                    log::warn!("timeout handling failed for chat {}: {}", chat_id, err);
                }
            })
        }
    };

    chats.arm(chat_id, QuestionTimer::start(time_limit, on_tick, on_expire));
    log::debug!(
        "chat {}: question {} of {} shown, {}s on the clock",
        chat_id,
        index + 1,
        total,
        time_limit
    );

    dialogue.update(State::AnswerQuestion { engine }).await?;
    Ok(())
    })
}

/// The countdown ran out. The user may have answered in the meantime, so
/// the engine re-checks the question index before resolving.
async fn handle_timeout(
    chats: ActiveChats,
    time_limit: u32,
    bot: Bot,
    dialogue: QuizDialogue,
    chat_id: ChatId,
    index: usize,
) -> HandlerResult {
    let gate = chats.gate(chat_id);
    let _resolving = gate.lock().await;

    let mut engine = match dialogue.get().await? {
        Some(State::AnswerQuestion { engine }) => engine,
        _ => return Ok(()),
    };
    match engine.expire(index) {
        Ok(feedback) => {
            resolve_question(chats.clone(), time_limit, bot, dialogue, chat_id, engine, feedback)
                .await
        }
        Err(err) => {
            // The user answered while this expiry was waiting for the gate.
            log::debug!("stale countdown for chat {}: {}", chat_id, err);
            Ok(())
        }
    }
}

/// Shows the answer feedback, waits out the feedback delay, then moves on
/// to the next question or the results screen.
async fn resolve_question(
    chats: ActiveChats,
    time_limit: u32,
    bot: Bot,
    dialogue: QuizDialogue,
    chat_id: ChatId,
    mut engine: QuizEngine,
    feedback: QuizEvent,
) -> HandlerResult {
    let feedback_text = match &feedback {
        QuizEvent::AnswerFeedback {
            selected: Some(_),
            is_correct: true,
            ..
        } => "✅ Correct!".to_string(),
        QuizEvent::AnswerFeedback {
            selected: Some(_),
            correct_answer,
            ..
        } => format!("❌ Wrong. The correct answer is <b>{}</b>", correct_answer),
        QuizEvent::AnswerFeedback {
            selected: None,
            correct_answer,
            ..
        } => format!(
            "⏰ Time's up! The correct answer was <b>{}</b>",
            correct_answer
        ),
        _ => return Ok(()),
    };
    bot.send_message(chat_id, feedback_text)
        .parse_mode(ParseMode::Html)
        .await?;
    log::debug!(
        "chat {}: {} questions resolved, score {}",
        chat_id,
        engine.session().current_index,
        engine.session().score
    );

    tokio::time::sleep(FEEDBACK_DELAY).await;

    match engine.advance() {
        Ok(shown @ QuizEvent::QuestionShown { .. }) => {
            show_question(chats, time_limit, bot, dialogue, chat_id, engine, shown).await
        }
        Ok(QuizEvent::QuizComplete {
            score,
            total,
            answer_log,
        }) => {
            chats.disarm(chat_id);
            let keyboard = KeyboardMarkup::new(vec![vec![KeyboardButton::new(RESTART_QUIZ)]]);
            bot.send_message(chat_id, results_text(score, total, &answer_log))
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard)
                .await?;
            dialogue.update(State::ReceiveRestart { engine }).await?;
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(err) => {
            log::error!("could not advance the quiz for chat {}: {}", chat_id, err);
            Ok(())
        }
    }
}

fn results_text(score: u32, total: usize, answer_log: &[AnswerRecord]) -> String {
    let mut text = format!(
        "<b>Quiz Complete!</b>\nYour final score: {} out of {}\n",
        score, total
    );
    for (number, record) in answer_log.iter().enumerate() {
        let mark = if record.is_correct { "✅" } else { "❌" };
        let selected = record.selected.as_deref().unwrap_or("none");
        text.push_str(&format!(
            "\n{} <b>Question {}:</b> {}\nYour answer: {}\nCorrect answer: {}\n",
            mark,
            number + 1,
            record.prompt,
            selected,
            record.correct_answer
        ));
    }
    text
}

fn fmt_remaining(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
