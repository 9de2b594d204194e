//! Per-user intake conversation. One session per user; a new `/start` clears
//! any in-flight session. Each collecting step validates its field, re-prompts
//! in place on failure and advances on success. The session map is owned here
//! and injected into the runtime, never module-global.

use crate::functions::validate;
use crate::schema::{Category, ComplaintDraft};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStep {
    Name,
    NationalId,
    Phone,
    Address,
    Category,
    Body,
    Attachment,
}

/// Number of collecting steps a valid submission passes through.
pub const REQUIRED_STEPS: usize = 7;

#[derive(Debug, Default)]
struct Scratch {
    name: Option<String>,
    national_id: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    category: Option<Category>,
    body: Option<String>,
    image_ref: Option<String>,
}

#[derive(Debug)]
struct Session {
    step: IntakeStep,
    scratch: Scratch,
}

#[derive(Debug, Clone, Copy)]
pub enum IntakeInput<'a> {
    Text(&'a str),
    CategoryChoice(Category),
    Photo(&'a str),
    SkipAttachment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntakeEvent {
    /// Field accepted, session moved to the next step.
    Advanced { prompt: String },
    /// Field rejected, same step re-prompted. Never fatal.
    Rejected { prompt: String },
    /// All fields collected and re-checked; session is cleared.
    Finalized(Box<ComplaintDraft>),
    /// Finalize found a missing scratch field. Internal inconsistency, not
    /// bad user input; the session is cleared instead of re-prompting.
    Aborted,
    /// The user has no open session.
    NoSession,
}

fn prompt_for(step: IntakeStep) -> String {
    let n = REQUIRED_STEPS;
    match step {
        IntakeStep::Name => format!(
            "Step 1/{n}. Enter your full name, at least two words. Example: Aliyev Vali Akramovich"
        ),
        IntakeStep::NationalId => format!(
            "Step 2/{n}. Enter your national id: two letters and seven digits. Example: AB1234567"
        ),
        IntakeStep::Phone => {
            format!("Step 3/{n}. Enter your phone number. Example: +998901234567")
        }
        IntakeStep::Address => format!("Step 4/{n}. Enter your home address."),
        IntakeStep::Category => {
            let mut prompt = format!("Step 5/{n}. Choose a complaint category:\n");
            for category in Category::ALL {
                prompt.push_str(&format!("  /cat_{} - {}\n", category.slug(), category.label()));
            }
            prompt
        }
        IntakeStep::Body => {
            format!("Step 6/{n}. Describe your issue in detail, at least 10 characters.")
        }
        IntakeStep::Attachment => {
            format!("Step 7/{n}. Attach one photo of the issue, or /skip to continue without one.")
        }
    }
}

fn rejection_for(step: IntakeStep) -> String {
    let reason = match step {
        IntakeStep::Name => "That does not look like a full name.",
        IntakeStep::NationalId => "That does not match the national id format.",
        IntakeStep::Phone => "That does not look like a valid phone number.",
        IntakeStep::Address => "That address is too short.",
        IntakeStep::Category => "Please pick one of the listed categories.",
        IntakeStep::Body => "That description is too short.",
        IntakeStep::Attachment => "Send a single photo, or /skip.",
    };
    format!("{reason}\n{}", prompt_for(step))
}

enum StepResult {
    Advance(IntakeStep),
    Reject,
    Finalize,
}

fn apply(session: &mut Session, input: IntakeInput<'_>) -> StepResult {
    match (session.step, input) {
        (IntakeStep::Name, IntakeInput::Text(text)) if validate::valid_full_name(text) => {
            session.scratch.name = Some(text.trim().to_string());
            StepResult::Advance(IntakeStep::NationalId)
        }
        (IntakeStep::NationalId, IntakeInput::Text(text)) => {
            let normalized = validate::normalize_national_id(text);
            if validate::valid_national_id(&normalized) {
                session.scratch.national_id = Some(normalized);
                StepResult::Advance(IntakeStep::Phone)
            } else {
                StepResult::Reject
            }
        }
        (IntakeStep::Phone, IntakeInput::Text(text)) if validate::valid_phone(text) => {
            session.scratch.phone = Some(text.trim().to_string());
            StepResult::Advance(IntakeStep::Address)
        }
        (IntakeStep::Address, IntakeInput::Text(text)) if validate::valid_address(text) => {
            session.scratch.address = Some(text.trim().to_string());
            StepResult::Advance(IntakeStep::Category)
        }
        // category is an explicit choice; typed text is rejected
        (IntakeStep::Category, IntakeInput::CategoryChoice(category)) => {
            session.scratch.category = Some(category);
            StepResult::Advance(IntakeStep::Body)
        }
        (IntakeStep::Body, IntakeInput::Text(text)) if validate::valid_body(text) => {
            session.scratch.body = Some(text.trim().to_string());
            StepResult::Advance(IntakeStep::Attachment)
        }
        // the only step with two success transitions: photo or explicit skip
        (IntakeStep::Attachment, IntakeInput::Photo(image_ref)) => {
            session.scratch.image_ref = Some(image_ref.to_string());
            StepResult::Finalize
        }
        (IntakeStep::Attachment, IntakeInput::SkipAttachment) => StepResult::Finalize,
        _ => StepResult::Reject,
    }
}

/// Defensive re-check that every required scratch field survived collection.
fn assemble(user_id: i64, scratch: Scratch) -> Option<ComplaintDraft> {
    Some(ComplaintDraft {
        user_id,
        name: scratch.name?,
        national_id: scratch.national_id?,
        phone: scratch.phone?,
        address: scratch.address?,
        category: scratch.category?,
        body: scratch.body?,
        image_ref: scratch.image_ref,
    })
}

pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a fresh session, replacing any in-flight one, and returns the
    /// first prompt. Quota admission happens before this call.
    pub async fn begin(&self, user_id: i64) -> String {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            user_id,
            Session {
                step: IntakeStep::Name,
                scratch: Scratch::default(),
            },
        );
        tracing::debug!(user_id, "intake: session opened");
        prompt_for(IntakeStep::Name)
    }

    pub async fn clear(&self, user_id: i64) -> bool {
        self.sessions.lock().await.remove(&user_id).is_some()
    }

    pub async fn is_active(&self, user_id: i64) -> bool {
        self.sessions.lock().await.contains_key(&user_id)
    }

    pub async fn handle(&self, user_id: i64, input: IntakeInput<'_>) -> IntakeEvent {
        let mut sessions = self.sessions.lock().await;
        let Some(mut session) = sessions.remove(&user_id) else {
            return IntakeEvent::NoSession;
        };

        match apply(&mut session, input) {
            StepResult::Advance(next) => {
                session.step = next;
                sessions.insert(user_id, session);
                IntakeEvent::Advanced {
                    prompt: prompt_for(next),
                }
            }
            StepResult::Reject => {
                let prompt = rejection_for(session.step);
                sessions.insert(user_id, session);
                IntakeEvent::Rejected { prompt }
            }
            // session stays cleared whatever finalize decides
            StepResult::Finalize => match assemble(user_id, session.scratch) {
                Some(draft) => IntakeEvent::Finalized(Box::new(draft)),
                None => {
                    tracing::error!(user_id, "intake: finalize with incomplete scratch");
                    IntakeEvent::Aborted
                }
            },
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn advance(store: &SessionStore, user_id: i64, input: IntakeInput<'_>) -> IntakeEvent {
        let event = store.handle(user_id, input).await;
        assert!(
            matches!(event, IntakeEvent::Advanced { .. }),
            "expected advance, got {event:?}"
        );
        event
    }

    async fn walk_to_attachment(store: &SessionStore, user_id: i64) {
        store.begin(user_id).await;
        advance(store, user_id, IntakeInput::Text("Ali Valiyev")).await;
        advance(store, user_id, IntakeInput::Text("AB1234567")).await;
        advance(store, user_id, IntakeInput::Text("+998901234567")).await;
        advance(store, user_id, IntakeInput::Text("Tashkent city, block 5")).await;
        advance(store, user_id, IntakeInput::CategoryChoice(Category::Health)).await;
        advance(
            store,
            user_id,
            IntakeInput::Text("My water pipe is broken for two weeks"),
        )
        .await;
    }

    #[tokio::test]
    async fn valid_sequence_finalizes_in_exactly_required_steps() {
        let store = SessionStore::new();
        store.begin(1).await;

        let inputs = [
            IntakeInput::Text("Ali Valiyev"),
            IntakeInput::Text("AB1234567"),
            IntakeInput::Text("+998901234567"),
            IntakeInput::Text("Tashkent city, block 5"),
            IntakeInput::CategoryChoice(Category::Health),
            IntakeInput::Text("My water pipe is broken for two weeks"),
            IntakeInput::SkipAttachment,
        ];
        assert_eq!(inputs.len(), REQUIRED_STEPS);

        let mut successes = 0;
        let mut finalized = None;
        for input in inputs {
            match store.handle(1, input).await {
                IntakeEvent::Advanced { .. } => successes += 1,
                IntakeEvent::Finalized(draft) => {
                    successes += 1;
                    finalized = Some(draft);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(successes, REQUIRED_STEPS);

        let draft = *finalized.expect("finalized draft");
        assert_eq!(draft.user_id, 1);
        assert_eq!(draft.name, "Ali Valiyev");
        assert_eq!(draft.national_id, "AB1234567");
        assert_eq!(draft.category, Category::Health);
        assert_eq!(draft.image_ref, None);
        assert!(!store.is_active(1).await);
    }

    #[tokio::test]
    async fn retries_do_not_change_the_success_step_count() {
        let store = SessionStore::new();
        store.begin(1).await;

        // three rejected attempts on the first field
        for bad in ["Ali", "Ali 42", ""] {
            let event = store.handle(1, IntakeInput::Text(bad)).await;
            assert!(matches!(event, IntakeEvent::Rejected { .. }));
        }
        advance(&store, 1, IntakeInput::Text("Ali Valiyev")).await;

        // rejected national id keeps the session on the same step
        let event = store.handle(1, IntakeInput::Text("12ABCDEFG")).await;
        assert!(matches!(event, IntakeEvent::Rejected { .. }));
        advance(&store, 1, IntakeInput::Text("ab1234567")).await;
    }

    #[tokio::test]
    async fn national_id_is_uppercased_before_storing() {
        let store = SessionStore::new();
        store.begin(2).await;
        advance(&store, 2, IntakeInput::Text("Ali Valiyev")).await;
        advance(&store, 2, IntakeInput::Text("ab1234567")).await;
        advance(&store, 2, IntakeInput::Text("+998901234567")).await;
        advance(&store, 2, IntakeInput::Text("Tashkent city, block 5")).await;
        advance(&store, 2, IntakeInput::CategoryChoice(Category::Other)).await;
        advance(&store, 2, IntakeInput::Text("The elevator is broken again")).await;
        let IntakeEvent::Finalized(draft) = store.handle(2, IntakeInput::SkipAttachment).await
        else {
            panic!("expected finalize");
        };
        assert_eq!(draft.national_id, "AB1234567");
    }

    #[tokio::test]
    async fn typed_text_is_rejected_on_the_category_step() {
        let store = SessionStore::new();
        store.begin(1).await;
        advance(&store, 1, IntakeInput::Text("Ali Valiyev")).await;
        advance(&store, 1, IntakeInput::Text("AB1234567")).await;
        advance(&store, 1, IntakeInput::Text("+998901234567")).await;
        advance(&store, 1, IntakeInput::Text("Tashkent city, block 5")).await;

        let event = store.handle(1, IntakeInput::Text("Health")).await;
        assert!(matches!(event, IntakeEvent::Rejected { .. }));
        advance(&store, 1, IntakeInput::CategoryChoice(Category::Health)).await;
    }

    #[tokio::test]
    async fn photo_finalizes_with_image_reference() {
        let store = SessionStore::new();
        walk_to_attachment(&store, 1).await;

        let IntakeEvent::Finalized(draft) =
            store.handle(1, IntakeInput::Photo("media/1_1.jpg")).await
        else {
            panic!("expected finalize");
        };
        assert_eq!(draft.image_ref.as_deref(), Some("media/1_1.jpg"));
    }

    #[tokio::test]
    async fn new_start_replaces_the_session_from_the_beginning() {
        let store = SessionStore::new();
        store.begin(1).await;
        advance(&store, 1, IntakeInput::Text("Ali Valiyev")).await;

        // restarting puts the user back on the name step
        store.begin(1).await;
        let event = store.handle(1, IntakeInput::Text("AB1234567")).await;
        assert!(
            matches!(event, IntakeEvent::Rejected { .. }),
            "an id is not a valid name, so the session must be on the name step"
        );
    }

    #[tokio::test]
    async fn input_without_session_reports_no_session() {
        let store = SessionStore::new();
        assert_eq!(
            store.handle(1, IntakeInput::Text("hello")).await,
            IntakeEvent::NoSession
        );
        assert!(!store.clear(1).await);
    }

    #[tokio::test]
    async fn sessions_are_scoped_per_user() {
        let store = SessionStore::new();
        store.begin(1).await;
        store.begin(2).await;
        advance(&store, 1, IntakeInput::Text("Ali Valiyev")).await;

        // user 2 is still on the name step
        let event = store.handle(2, IntakeInput::Text("AB1234567")).await;
        assert!(matches!(event, IntakeEvent::Rejected { .. }));
    }
}
