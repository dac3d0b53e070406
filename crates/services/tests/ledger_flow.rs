use std::time::Duration;

use services::{Clock, Ledger, LedgerConfig, LedgerError, Session};
use storage::repository::{InMemoryRepository, Storage};
use tutor_core::model::{InteractionEvent, Learner, LearnerId, LessonId, Role, Sender};
use tutor_core::time::fixed_now;

fn ledger(repo: &InMemoryRepository, latency: Duration) -> Ledger {
    Ledger::new(
        LedgerConfig::default().with_tutor_latency(latency),
        Clock::fixed(fixed_now()),
        Storage::from_repository(repo.clone()),
    )
}

fn student(id: &str) -> Learner {
    Learner::student(LearnerId::new(id).unwrap())
}

async fn open(ledger: &Ledger, id: &str, lesson: u32) -> Session {
    let mut session = ledger.login(student(id)).await.unwrap();
    ledger
        .select_lesson(&mut session, LessonId::new(lesson))
        .await
        .unwrap()
        .expect("lesson in catalog");
    session
}

#[tokio::test]
async fn threads_alternate_and_ids_increase() {
    let repo = InMemoryRepository::new();
    let ledger = ledger(&repo, Duration::ZERO);
    let session = open(&ledger, "usr_1", 1).await;

    for text in ["first", "second", "third"] {
        ledger
            .send_message_and_wait(&session, text)
            .await
            .unwrap()
            .expect("tutor reply");
    }

    let thread = ledger.get_conversation(&session, LessonId::new(1)).await;
    assert_eq!(thread.len(), 6);
    for (i, message) in thread.iter().enumerate() {
        let expected = if i % 2 == 0 { Sender::Learner } else { Sender::Tutor };
        assert_eq!(message.sender(), expected);
    }
    assert!(thread.windows(2).all(|w| w[0].id() < w[1].id()));
    assert!(thread.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    assert_eq!(thread[4].text(), "third");
}

#[tokio::test(start_paused = true)]
async fn second_send_is_rejected_while_reply_pending() {
    let repo = InMemoryRepository::new();
    let ledger = ledger(&repo, Duration::from_millis(1000));
    let session = open(&ledger, "usr_1", 2).await;
    let lesson = LessonId::new(2);

    let pending = ledger
        .send_message(&session, "what is a qubit?")
        .await
        .unwrap()
        .expect("message accepted");
    assert_eq!(pending.learner_message().text(), "what is a qubit?");
    assert!(ledger.is_pending(&session, lesson).await);

    let err = ledger.send_message(&session, "hello?").await.unwrap_err();
    assert!(matches!(err, LedgerError::ConcurrentSendRejected(id) if id == lesson));
    let err = ledger.clear_conversation(&session, lesson).await.unwrap_err();
    assert!(matches!(err, LedgerError::ReplyPending(_)));
    assert_eq!(ledger.get_conversation(&session, lesson).await.len(), 1);

    let reply = pending.wait().await.unwrap();
    assert_eq!(reply.sender(), Sender::Tutor);
    assert!(!ledger.is_pending(&session, lesson).await);
    assert_eq!(ledger.get_conversation(&session, lesson).await.len(), 2);

    ledger
        .send_message_and_wait(&session, "and superposition?")
        .await
        .unwrap()
        .expect("tutor reply");
    assert_eq!(ledger.get_conversation(&session, lesson).await.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn pending_replies_in_different_lessons_do_not_block_each_other() {
    let repo = InMemoryRepository::new();
    let ledger = ledger(&repo, Duration::from_millis(1000));
    let mut session = open(&ledger, "usr_1", 1).await;

    let first = ledger.send_message(&session, "one").await.unwrap().unwrap();
    ledger
        .select_lesson(&mut session, LessonId::new(4))
        .await
        .unwrap();
    let second = ledger.send_message(&session, "four").await.unwrap().unwrap();

    assert_eq!(first.wait().await.unwrap().sender(), Sender::Tutor);
    assert_eq!(second.wait().await.unwrap().sender(), Sender::Tutor);
    let all = ledger.get_all_conversations(&session).await;
    assert_eq!(all[&LessonId::new(1)].len(), 2);
    assert_eq!(all[&LessonId::new(4)].len(), 2);
}

#[tokio::test(start_paused = true)]
async fn logout_keeps_a_reply_still_in_flight() {
    let repo = InMemoryRepository::new();
    let ledger = ledger(&repo, Duration::from_millis(1000));
    let session = open(&ledger, "usr_1", 1).await;
    let first = ledger
        .send_message(&session, "lesson one")
        .await
        .unwrap()
        .expect("message accepted");
    ledger.logout(session).await;

    let session = open(&ledger, "usr_1", 2).await;
    let second = ledger
        .send_message(&session, "lesson two")
        .await
        .unwrap()
        .expect("message accepted");
    first.wait().await.unwrap();
    second.wait().await.unwrap();
    ledger.logout(session).await;

    let session = ledger.login(student("usr_1")).await.unwrap();
    let one = ledger.get_conversation(&session, LessonId::new(1)).await;
    let two = ledger.get_conversation(&session, LessonId::new(2)).await;
    assert_eq!(one.len(), 2);
    assert_eq!(two.len(), 2);
    assert_eq!(one[0].text(), "lesson one");
    assert_eq!(two[0].text(), "lesson two");

    let ids: std::collections::BTreeSet<_> = one.iter().chain(&two).map(|m| m.id()).collect();
    assert_eq!(ids.len(), 4);
    assert!(ledger.take_error(&session).await.is_none());
}

#[tokio::test]
async fn message_text_is_stored_as_sent() {
    let repo = InMemoryRepository::new();
    let ledger = ledger(&repo, Duration::ZERO);
    let session = open(&ledger, "usr_1", 1).await;

    ledger
        .send_message_and_wait(&session, "  indented question\n")
        .await
        .unwrap()
        .expect("tutor reply");
    let thread = ledger.get_conversation(&session, LessonId::new(1)).await;
    assert_eq!(thread[0].text(), "  indented question\n");
}

#[tokio::test]
async fn clearing_a_thread_leaves_progress_alone() {
    let repo = InMemoryRepository::new();
    let ledger = ledger(&repo, Duration::ZERO);
    let session = open(&ledger, "usr_1", 3).await;
    let lesson = LessonId::new(3);

    ledger
        .record_interaction(&session, lesson, InteractionEvent::Start)
        .await
        .unwrap();
    ledger.send_message_and_wait(&session, "entangle me").await.unwrap();
    ledger
        .record_interaction(&session, lesson, InteractionEvent::message(["entanglement"]))
        .await
        .unwrap();
    let before = ledger.get_lesson_progress(&session, lesson).await;
    assert_eq!(before.progress_percentage(), 11);

    ledger.clear_conversation(&session, lesson).await.unwrap();
    assert!(ledger.get_conversation(&session, lesson).await.is_empty());
    assert_eq!(ledger.get_lesson_progress(&session, lesson).await, before);
    assert_eq!(
        repo.raw("conversations:usr_1").and_then(|v| v.get("3").cloned()),
        Some(serde_json::json!([]))
    );
}

#[tokio::test]
async fn learners_are_isolated() {
    let repo = InMemoryRepository::new();
    let ledger = ledger(&repo, Duration::ZERO);
    let amy = open(&ledger, "amy", 1).await;
    let bob = open(&ledger, "bob", 1).await;

    ledger.send_message_and_wait(&amy, "hi").await.unwrap();
    ledger
        .record_interaction(&amy, LessonId::new(1), InteractionEvent::Complete)
        .await
        .unwrap();

    assert!(ledger.get_conversation(&bob, LessonId::new(1)).await.is_empty());
    assert_eq!(ledger.get_completed_lessons_count(&bob).await, 0);
    assert_eq!(ledger.get_completed_lessons_count(&amy).await, 1);
    assert_eq!(ledger.get_overall_progress(&amy).await, 10);
}

#[tokio::test]
async fn progress_survives_a_restart() {
    let repo = InMemoryRepository::new();
    {
        let first = ledger(&repo, Duration::ZERO);
        let session = open(&first, "usr_1", 2).await;
        first
            .record_interaction(&session, LessonId::new(2), InteractionEvent::Start)
            .await
            .unwrap();
        for _ in 0..20 {
            first
                .record_interaction(
                    &session,
                    LessonId::new(2),
                    InteractionEvent::message(None::<&str>),
                )
                .await
                .unwrap();
        }
        first.send_message_and_wait(&session, "hello").await.unwrap();
        first.logout(session).await;
    }

    let second = ledger(&repo, Duration::ZERO);
    let session = second.login(student("usr_1")).await.unwrap();
    let progress = second.get_lesson_progress(&session, LessonId::new(2)).await;
    assert_eq!(progress.interactions(), 20);
    assert_eq!(progress.progress_percentage(), 70);
    assert_eq!(second.get_in_progress_lessons(&session).await, vec![LessonId::new(2)]);
    assert_eq!(second.get_conversation(&session, LessonId::new(2)).await.len(), 2);

    let summary = second.progress_summary(&session).await;
    assert_eq!(summary.overall, 7);
    assert_eq!(summary.in_progress, vec![LessonId::new(2)]);
    assert_eq!(summary.not_started, 9);
}

#[tokio::test]
async fn storage_failure_is_reported_but_memory_keeps_the_change() {
    let repo = InMemoryRepository::new();
    let ledger = ledger(&repo, Duration::ZERO);
    let session = open(&ledger, "usr_1", 5).await;
    let lesson = LessonId::new(5);
    repo.set_unavailable(true);

    let err = ledger
        .record_interaction(&session, lesson, InteractionEvent::Complete)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::StorageUnavailable(_)));
    assert!(ledger.get_lesson_progress(&session, lesson).await.completed());

    let err = ledger
        .send_message_and_wait(&session, "still there?")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::StorageUnavailable(_)));
    assert_eq!(ledger.get_conversation(&session, lesson).await.len(), 2);
    assert!(matches!(
        ledger.take_error(&session).await,
        Some(LedgerError::StorageUnavailable(_))
    ));

    // Other lessons keep working once the backend is back.
    repo.set_unavailable(false);
    ledger
        .record_interaction(&session, LessonId::new(6), InteractionEvent::Start)
        .await
        .unwrap();
    assert!(ledger.take_error(&session).await.is_none());
}

#[tokio::test]
async fn first_login_without_storage_still_opens_a_session() {
    let repo = InMemoryRepository::new();
    repo.set_unavailable(true);
    let ledger = ledger(&repo, Duration::ZERO);

    let session = ledger.login(student("usr_1")).await.unwrap();
    assert_eq!(ledger.get_overall_progress(&session).await, 0);
    assert!(matches!(
        ledger.last_error(&session).await,
        Some(LedgerError::StorageUnavailable(_))
    ));
}

#[tokio::test]
async fn admin_overview_lists_every_stored_learner() {
    let repo = InMemoryRepository::new();
    let ledger = ledger(&repo, Duration::ZERO);
    let amy = open(&ledger, "amy", 1).await;
    ledger
        .record_interaction(&amy, LessonId::new(1), InteractionEvent::Complete)
        .await
        .unwrap();
    ledger.logout(amy).await;
    let _bob = ledger.login(student("bob")).await.unwrap();
    let _admin = ledger
        .login(Learner::new(LearnerId::new("root").unwrap(), Role::Admin))
        .await
        .unwrap();

    let overviews = ledger.learner_overviews().await.unwrap();
    let ids: Vec<&str> = overviews.iter().map(|o| o.learner.as_str()).collect();
    assert_eq!(ids, ["amy", "bob", "root"]);
    assert_eq!(overviews[0].overall, 10);
    assert_eq!(overviews[0].completed, 1);
    assert_eq!(overviews[0].last_active, Some(fixed_now()));
    assert_eq!(overviews[1].completed, 0);
    assert_eq!(overviews[1].last_active, None);
}
