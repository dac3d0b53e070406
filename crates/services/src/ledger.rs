use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use storage::repository::{Namespace, Storage};
use tokio::sync::{Mutex, Notify, oneshot};
use tracing::{debug, info, warn};
use tutor_core::model::{
    ConversationLog, InteractionEvent, Learner, LearnerId, Lesson, LessonId, LessonProgress,
    Message, ProgressLedger,
};
use tutor_core::responder::{CannedResponder, Responder};
use tutor_core::stats::{self, ProgressSummary};

use crate::Clock;
use crate::config::LedgerConfig;
use crate::conversation_store::ConversationStore;
use crate::error::{LedgerError, LedgerInitError};
use crate::progress_store::ProgressStore;

/// Explicit per-call context: who is asking and which lesson is open.
///
/// Obtained from [`Ledger::login`] and handed back to [`Ledger::logout`].
#[derive(Debug)]
pub struct Session {
    learner: Learner,
    active_lesson: Option<LessonId>,
}

impl Session {
    #[must_use]
    pub fn learner(&self) -> &Learner {
        &self.learner
    }

    #[must_use]
    pub fn learner_id(&self) -> &LearnerId {
        self.learner.id()
    }

    #[must_use]
    pub fn active_lesson(&self) -> Option<LessonId> {
        self.active_lesson
    }
}

/// Admin listing row for one stored learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LearnerOverview {
    pub learner: LearnerId,
    pub overall: u8,
    pub completed: usize,
    pub last_active: Option<DateTime<Utc>>,
}

struct LearnerState {
    progress: ProgressLedger,
    conversations: ConversationLog,
    pending: HashSet<LessonId>,
    /// Signalled each time a pending reply has been appended and persisted.
    settled: Arc<Notify>,
    last_error: Option<LedgerError>,
}

impl LearnerState {
    fn fail<T>(&mut self, err: LedgerError) -> Result<T, LedgerError> {
        warn!(error = %err, "ledger operation failed");
        self.last_error = Some(err.clone());
        Err(err)
    }
}

type SharedState = Arc<Mutex<LearnerState>>;

/// Handle to a tutor reply that arrives after the latency window.
#[derive(Debug)]
pub struct PendingReply {
    lesson: LessonId,
    learner_message: Message,
    reply: oneshot::Receiver<Result<Message, LedgerError>>,
}

impl PendingReply {
    #[must_use]
    pub fn lesson(&self) -> LessonId {
        self.lesson
    }

    /// The learner message already appended to the thread.
    #[must_use]
    pub fn learner_message(&self) -> &Message {
        &self.learner_message
    }

    /// Wait for the tutor message.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StorageUnavailable` if the reply was appended but
    /// could not be persisted, or `LedgerError::ReplyLost` if the reply task
    /// died.
    pub async fn wait(self) -> Result<Message, LedgerError> {
        self.reply.await.map_err(|_| LedgerError::ReplyLost)?
    }
}

/// The only entry point into learner progress and conversations.
///
/// State is loaded once per learner on login, mutated under a per-learner
/// lock, written through after every change and dropped on logout.
pub struct Ledger {
    config: LedgerConfig,
    storage: Storage,
    progress: ProgressStore,
    conversations: ConversationStore,
    learners: Mutex<HashMap<LearnerId, SharedState>>,
}

impl Ledger {
    #[must_use]
    pub fn new(config: LedgerConfig, clock: Clock, storage: Storage) -> Self {
        Self::with_responder(config, clock, storage, Arc::new(CannedResponder))
    }

    #[must_use]
    pub fn with_responder(
        config: LedgerConfig,
        clock: Clock,
        storage: Storage,
        responder: Arc<dyn Responder>,
    ) -> Self {
        let progress = ProgressStore::new(clock, Arc::clone(&storage.records));
        let conversations =
            ConversationStore::new(clock, Arc::clone(&storage.records), responder);
        Self {
            config,
            storage,
            progress,
            conversations,
            learners: Mutex::new(HashMap::new()),
        }
    }

    /// Build a ledger backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerInitError` if the database cannot be opened or migrated.
    pub async fn sqlite(
        db_url: &str,
        config: LedgerConfig,
        clock: Clock,
    ) -> Result<Self, LedgerInitError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(config, clock, storage))
    }

    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    #[must_use]
    pub fn lessons(&self) -> &'static [Lesson] {
        Lesson::catalog()
    }

    #[must_use]
    pub fn lesson(&self, id: LessonId) -> Option<&'static Lesson> {
        Lesson::find(id)
    }

    // ─── Session lifecycle ─────────────────────────────────────────────────────

    /// Load (or initialise) the learner's ledger and open a session.
    ///
    /// A learner seen for the first time gets ten zeroed lessons, written
    /// straight away. If that first write fails the session still opens
    /// and the failure is left in the error slot.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StorageUnavailable` if stored state cannot be read.
    pub async fn login(&self, learner: Learner) -> Result<Session, LedgerError> {
        let id = learner.id().clone();
        let mut learners = self.learners.lock().await;
        if !learners.contains_key(&id) {
            let state = self.load_state(&id).await?;
            learners.insert(id.clone(), Arc::new(Mutex::new(state)));
            info!(learner = %id, role = ?learner.role(), "ledger loaded");
        }
        Ok(Session {
            learner,
            active_lesson: None,
        })
    }

    /// Drop the learner's in-memory state. The persisted copy survives.
    ///
    /// Waits for tutor replies still in flight so their exchange is stored
    /// before the state goes away.
    pub async fn logout(&self, session: Session) {
        let id = session.learner_id();
        loop {
            let mut learners = self.learners.lock().await;
            let Some(state) = learners.get(id).map(Arc::clone) else {
                return;
            };
            let guard = state.lock().await;
            if guard.pending.is_empty() {
                learners.remove(id);
                info!(learner = %id, "ledger unloaded");
                return;
            }
            let settled = Arc::clone(&guard.settled);
            let notified = settled.notified();
            debug!(learner = %id, pending = guard.pending.len(), "logout waits for tutor replies");
            drop(guard);
            drop(learners);
            notified.await;
        }
    }

    async fn load_state(&self, learner: &LearnerId) -> Result<LearnerState, LedgerError> {
        let conversations = self.conversations.load(learner).await?;
        let mut last_error = None;
        let progress = match self.progress.load(learner).await? {
            Some(progress) => progress,
            None => {
                let progress = ProgressLedger::initial();
                if let Err(err) = self.progress.persist(learner, &progress).await {
                    warn!(learner = %learner, error = %err, "could not persist initial progress");
                    last_error = Some(LedgerError::from(err));
                }
                progress
            }
        };
        Ok(LearnerState {
            progress,
            conversations,
            pending: HashSet::new(),
            settled: Arc::new(Notify::new()),
            last_error,
        })
    }

    async fn state(&self, session: &Session) -> Option<SharedState> {
        self.learners
            .lock()
            .await
            .get(session.learner_id())
            .map(Arc::clone)
    }

    async fn require_state(&self, session: &Session) -> Result<SharedState, LedgerError> {
        self.state(session)
            .await
            .ok_or_else(|| LedgerError::NotLoggedIn(session.learner_id().clone()))
    }

    // ─── Conversations ─────────────────────────────────────────────────────────

    /// Make `lesson_id` the active lesson.
    ///
    /// Unknown ids clear the active lesson and return `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotLoggedIn` if the session was logged out.
    pub async fn select_lesson(
        &self,
        session: &mut Session,
        lesson_id: LessonId,
    ) -> Result<Option<&'static Lesson>, LedgerError> {
        let state = self.require_state(session).await?;
        let Some(lesson) = Lesson::find(lesson_id) else {
            debug!(lesson = %lesson_id, "select of unknown lesson");
            session.active_lesson = None;
            return Ok(None);
        };
        state.lock().await.conversations.open(lesson.id());
        session.active_lesson = Some(lesson.id());
        Ok(Some(lesson))
    }

    /// Send a learner message to the active lesson.
    ///
    /// Returns `Ok(None)` without touching anything when the text is blank or
    /// no lesson is active. Otherwise the learner message is appended at once
    /// and the tutor reply is scheduled; the returned handle resolves when it
    /// has been appended and persisted.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::ConcurrentSendRejected` while an earlier message
    /// to the same lesson still waits for its reply.
    pub async fn send_message(
        &self,
        session: &Session,
        text: &str,
    ) -> Result<Option<PendingReply>, LedgerError> {
        let Some(lesson) = session.active_lesson else {
            return Ok(None);
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        let state = self.require_state(session).await?;

        let (learner_message, reply) = {
            let mut guard = state.lock().await;
            if guard.pending.contains(&lesson) {
                return guard.fail(LedgerError::ConcurrentSendRejected(lesson));
            }
            let LearnerState {
                conversations,
                pending,
                ..
            } = &mut *guard;
            pending.insert(lesson);
            self.conversations.ask(conversations, lesson, text)
        };

        let (tx, rx) = oneshot::channel();
        let store = self.conversations.clone();
        let learner = session.learner_id().clone();
        let latency = self.config.tutor_latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let mut guard = state.lock().await;
            let message = store.answer(&mut guard.conversations, lesson, reply);
            guard.pending.remove(&lesson);
            let persisted = store.persist(&learner, &guard.conversations).await;
            let result = match persisted {
                Ok(()) => Ok(message),
                Err(err) => guard.fail(LedgerError::from(err)),
            };
            guard.settled.notify_waiters();
            drop(guard);
            // The caller may have dropped the handle; the reply is stored either way.
            let _ = tx.send(result);
        });

        Ok(Some(PendingReply {
            lesson,
            learner_message,
            reply: rx,
        }))
    }

    /// Send and wait for the tutor reply in one call.
    ///
    /// # Errors
    ///
    /// See [`Ledger::send_message`] and [`PendingReply::wait`].
    pub async fn send_message_and_wait(
        &self,
        session: &Session,
        text: &str,
    ) -> Result<Option<Message>, LedgerError> {
        match self.send_message(session, text).await? {
            Some(pending) => pending.wait().await.map(Some),
            None => Ok(None),
        }
    }

    /// True while a reply for the lesson has not been appended yet.
    pub async fn is_pending(&self, session: &Session, lesson: LessonId) -> bool {
        match self.state(session).await {
            Some(state) => state.lock().await.pending.contains(&lesson),
            None => false,
        }
    }

    /// Messages of a lesson in order; empty for unknown lessons.
    pub async fn get_conversation(&self, session: &Session, lesson: LessonId) -> Vec<Message> {
        match self.state(session).await {
            Some(state) => state.lock().await.conversations.thread(lesson).to_vec(),
            None => Vec::new(),
        }
    }

    /// Every thread of the learner, for chat-history views.
    pub async fn get_all_conversations(
        &self,
        session: &Session,
    ) -> BTreeMap<LessonId, Vec<Message>> {
        match self.state(session).await {
            Some(state) => state.lock().await.conversations.threads().clone(),
            None => BTreeMap::new(),
        }
    }

    /// Empty a lesson thread. Progress is not touched.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidLesson` for unknown lessons,
    /// `LedgerError::ReplyPending` while a reply is in flight, or
    /// `LedgerError::StorageUnavailable` if the empty thread was not persisted.
    pub async fn clear_conversation(
        &self,
        session: &Session,
        lesson: LessonId,
    ) -> Result<(), LedgerError> {
        let state = self.require_state(session).await?;
        let mut guard = state.lock().await;
        if Lesson::find(lesson).is_none() {
            return guard.fail(LedgerError::InvalidLesson(lesson));
        }
        if guard.pending.contains(&lesson) {
            return guard.fail(LedgerError::ReplyPending(lesson));
        }
        let learner = session.learner_id();
        let cleared = self
            .conversations
            .clear(learner, &mut guard.conversations, lesson)
            .await;
        match cleared {
            Ok(()) => {
                debug!(learner = %learner, lesson = %lesson, "conversation cleared");
                Ok(())
            }
            Err(err) => guard.fail(err.into()),
        }
    }

    // ─── Progress ──────────────────────────────────────────────────────────────

    /// Apply an interaction event to a lesson and persist the progress record.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidLesson` (nothing changes) for unknown
    /// lessons, or `LedgerError::StorageUnavailable` if the write failed; in
    /// that case the in-memory update is kept.
    pub async fn record_interaction(
        &self,
        session: &Session,
        lesson: LessonId,
        event: InteractionEvent,
    ) -> Result<LessonProgress, LedgerError> {
        let state = self.require_state(session).await?;
        let mut guard = state.lock().await;
        if Lesson::find(lesson).is_none() {
            return guard.fail(LedgerError::InvalidLesson(lesson));
        }
        let learner = session.learner_id();
        let recorded = self
            .progress
            .record(learner, &mut guard.progress, lesson, &event)
            .await;
        match recorded {
            Ok(updated) => Ok(updated),
            Err(err) => guard.fail(err.into()),
        }
    }

    /// The lesson's record, zeroed if none exists.
    pub async fn get_lesson_progress(&self, session: &Session, lesson: LessonId) -> LessonProgress {
        match self.state(session).await {
            Some(state) => state.lock().await.progress.lesson(lesson),
            None => LessonProgress::new(lesson),
        }
    }

    pub async fn get_overall_progress(&self, session: &Session) -> u8 {
        self.with_progress(session, stats::overall_progress).await
    }

    pub async fn get_completed_lessons_count(&self, session: &Session) -> usize {
        self.with_progress(session, stats::completed_count).await
    }

    pub async fn get_in_progress_lessons(&self, session: &Session) -> Vec<LessonId> {
        self.with_progress(session, stats::in_progress_lessons).await
    }

    pub async fn progress_summary(&self, session: &Session) -> ProgressSummary {
        self.with_progress(session, ProgressSummary::from_ledger)
            .await
    }

    async fn with_progress<T>(&self, session: &Session, f: impl FnOnce(&ProgressLedger) -> T) -> T {
        match self.state(session).await {
            Some(state) => f(&state.lock().await.progress),
            None => f(&ProgressLedger::default()),
        }
    }

    // ─── Errors ────────────────────────────────────────────────────────────────

    /// Most recent error for the session's learner, left in place.
    pub async fn last_error(&self, session: &Session) -> Option<LedgerError> {
        let state = self.state(session).await?;
        let guard = state.lock().await;
        guard.last_error.clone()
    }

    /// Most recent error for the session's learner, clearing the slot.
    pub async fn take_error(&self, session: &Session) -> Option<LedgerError> {
        let state = self.state(session).await?;
        let mut guard = state.lock().await;
        guard.last_error.take()
    }

    // ─── Admin ─────────────────────────────────────────────────────────────────

    /// Progress overview of every learner with a stored record.
    ///
    /// Learners currently logged in are summarised from memory so the
    /// numbers match what they see.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StorageUnavailable` if the listing or a record
    /// cannot be read.
    pub async fn learner_overviews(&self) -> Result<Vec<LearnerOverview>, LedgerError> {
        let ids = self
            .storage
            .records
            .list_learners(Namespace::Progress)
            .await?;
        let mut overviews = Vec::with_capacity(ids.len());
        for id in ids {
            let loaded = self.learners.lock().await.get(&id).map(Arc::clone);
            let progress = match loaded {
                Some(state) => state.lock().await.progress.clone(),
                None => self.progress.load(&id).await?.unwrap_or_default(),
            };
            overviews.push(LearnerOverview {
                overall: stats::overall_progress(&progress),
                completed: stats::completed_count(&progress),
                last_active: stats::last_active(&progress),
                learner: id,
            });
        }
        Ok(overviews)
    }
}
