use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use services::{
    Clock, CompletionStore, EngineConfig, EventTopic, FetchOutcome, LearningService,
    OptimisticUpdateProtocol, ProgressEvent, ProgressEvents, ProgressTracker, QuizPhase,
    StudyPlanService, SubmitOutcome,
};
use storage::backend::{
    DocumentKey, Endpoint, InMemoryBackend, ProgressBackend, StudyPlan, StudyPlanEntry,
};
use study_core::model::{
    Curriculum, QuizAnswers, QuizQuestion, QuizScore, SubjectContext, TopicKey, TopicStep,
    Tristate,
};
use study_core::time::fixed_now;

fn subject() -> SubjectContext {
    SubjectContext::new("Statistics", 2, 2).unwrap()
}

fn curriculum() -> Curriculum {
    serde_json::from_str(
        r#"{
            "units": [
                {
                    "title": "Descriptive",
                    "topics": [
                        { "title": "Mean" },
                        { "title": "Variance" },
                        { "title": "Topic X" }
                    ]
                }
            ]
        }"#,
    )
    .unwrap()
}

fn questions() -> Vec<QuizQuestion> {
    vec![QuizQuestion {
        question: "Variance of a constant?".into(),
        options: vec!["0".into(), "1".into()],
        correct_index: Some(0),
    }]
}

fn service(backend: &InMemoryBackend) -> LearningService {
    LearningService::new(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        &EngineConfig::default(),
        Clock::fixed(fixed_now()),
    )
}

#[tokio::test(start_paused = true)]
async fn quiz_completion_moves_navigation_forward_without_closing_gaps() {
    let backend = InMemoryBackend::new();
    backend.add_document(
        &subject(),
        "Variance",
        DocumentKey::new("stats/variance"),
        questions(),
    );
    backend.fail(Endpoint::Completion);
    let service = service(&backend);
    let mut progress_events = service.events().subscribe_topic(EventTopic::ProgressUpdated);

    assert!(matches!(
        service.load_subject(subject(), curriculum()).await,
        FetchOutcome::Failed(_)
    ));
    let variance = TopicKey::new(0, 1);
    service.select_topic(variance).await.unwrap();
    service.record_video_progress(1.0).unwrap();
    service.mark_notes_read().unwrap();

    assert_eq!(service.open_quiz().await.unwrap(), QuizPhase::Ready);
    let outcome = service
        .submit_quiz(QuizAnswers::new(vec![Some(0)]))
        .await
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::Confirmed(QuizScore::new(1, 1)));

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(service.store().status(variance), Tristate::True);
    assert_eq!(service.store().status(TopicKey::new(0, 0)), Tristate::Unknown);
    assert_eq!(service.next_topic_forward(), Some(TopicKey::new(0, 2)));
    assert_eq!(service.sequential_completion_end(0), None);
    assert!(!service.all_topics_complete());

    let mut steps = Vec::new();
    while let Some(ProgressEvent::ProgressUpdated { step, .. }) = progress_events.try_recv() {
        steps.push(step);
    }
    assert_eq!(steps, vec![TopicStep::Video, TopicStep::Notes, TopicStep::Quiz]);
}

#[tokio::test(start_paused = true)]
async fn refresh_downgrades_stale_optimism() {
    let backend = InMemoryBackend::new();
    backend.set_completed(&subject(), ["Mean"]);
    let service = service(&backend);
    service.load_subject(subject(), curriculum()).await;

    let topic_x = TopicKey::new(0, 2);
    service.store().mark_completed_local("Topic X");
    assert_eq!(service.store().status(topic_x), Tristate::True);

    assert_eq!(service.force_refresh().await, FetchOutcome::Applied);
    assert_eq!(service.store().status(topic_x), Tristate::False);
    assert_eq!(service.store().status(TopicKey::new(0, 0)), Tristate::True);
}

#[tokio::test(start_paused = true)]
async fn verification_bursts_coalesce() {
    let backend = InMemoryBackend::new();
    let backend_arc: Arc<dyn ProgressBackend> = Arc::new(backend.clone());
    let store = CompletionStore::new(Arc::clone(&backend_arc), ProgressTracker::new());
    store.load_subject(subject(), Arc::new(curriculum()));
    let protocol = OptimisticUpdateProtocol::new(
        store,
        ProgressEvents::new(),
        backend_arc,
        Duration::from_millis(200),
        Duration::from_secs(3),
    );

    for _ in 0..5 {
        protocol.request_verification(TopicKey::new(0, 1));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(backend.calls(Endpoint::TopicCompletion), 1);
}

#[tokio::test(start_paused = true)]
async fn late_study_plan_response_is_discarded() {
    let day_a = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let day_b = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
    let backend = InMemoryBackend::new();
    for (date, topic) in [(day_a, "Mean"), (day_b, "Variance")] {
        backend.set_study_plan(StudyPlan {
            date,
            entries: vec![StudyPlanEntry {
                topic_title: topic.into(),
                unit_title: "Descriptive".into(),
                done: false,
            }],
        });
    }
    backend.set_study_plan_delay(day_a, Duration::from_millis(800));
    backend.set_study_plan_delay(day_b, Duration::from_millis(100));
    let plans = StudyPlanService::new(Arc::new(backend.clone()));

    let pending_a = {
        let plans = plans.clone();
        tokio::spawn(async move { plans.select_date(day_a).await })
    };
    tokio::task::yield_now().await;
    let b = plans.select_date(day_b).await.unwrap();

    assert_eq!(b.entries[0].topic_title, "Variance");
    assert!(pending_a.await.unwrap().is_none());
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(plans.current().unwrap().date, day_b);
    assert_eq!(backend.calls(Endpoint::StudyPlan), 2);
}

async fn ready_for_quiz(backend: &InMemoryBackend) -> (LearningService, TopicKey) {
    backend.add_document(
        &subject(),
        "Mean",
        DocumentKey::new("stats/mean"),
        questions(),
    );
    let service = service(backend);
    service.load_subject(subject(), curriculum()).await;
    let mean = TopicKey::new(0, 0);
    service.select_topic(mean).await.unwrap();
    service.record_video_progress(1.0).unwrap();
    service.mark_notes_read().unwrap();
    service.open_quiz().await.unwrap();
    (service, mean)
}

#[tokio::test(start_paused = true)]
async fn failed_submission_reconciles_after_delay() {
    let backend = InMemoryBackend::new();
    let (service, mean) = ready_for_quiz(&backend).await;

    // Verification and its immediate refresh both fail, leaving the
    // delayed refresh as the only way back to backend truth.
    backend.fail(Endpoint::SubmitQuizScore);
    backend.fail(Endpoint::TopicCompletion);
    backend.fail(Endpoint::Completion);
    let before = backend.calls(Endpoint::Completion);
    let outcome = service
        .submit_quiz(QuizAnswers::new(vec![Some(0)]))
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Pending { .. }));
    assert_eq!(service.store().status(mean), Tristate::True);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(backend.calls(Endpoint::TopicCompletion), 2);
    assert_eq!(backend.calls(Endpoint::Completion), before + 1);
    backend.recover(Endpoint::Completion);

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert_eq!(service.store().status(mean), Tristate::True);
    assert_eq!(service.quiz().phase(), QuizPhase::Reconciling);
    assert_eq!(backend.calls(Endpoint::Completion), before + 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.calls(Endpoint::Completion), before + 2);
    assert_eq!(service.store().status(mean), Tristate::False);
    assert_eq!(service.quiz().phase(), QuizPhase::Ready);
    assert_eq!(service.quiz().record(), None);

    // The protocol's own retry lands shortly after and agrees.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(backend.calls(Endpoint::Completion), before + 3);
    assert_eq!(service.store().status(mean), Tristate::False);
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_submission_does_not_stay_provisional() {
    let backend = InMemoryBackend::new();
    let (service, mean) = ready_for_quiz(&backend).await;

    backend.fail(Endpoint::SubmitQuizScore);
    service
        .submit_quiz(QuizAnswers::new(vec![Some(0)]))
        .await
        .unwrap();
    assert_eq!(service.quiz().phase(), QuizPhase::Reconciling);
    assert!(service.quiz().record().is_some());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(service.store().status(mean), Tristate::False);
    assert_eq!(service.quiz().phase(), QuizPhase::Ready);
    assert_eq!(service.quiz().record(), None);

    // Retaking the quiz after reconciliation goes through normally.
    backend.recover(Endpoint::SubmitQuizScore);
    let outcome = service
        .submit_quiz(QuizAnswers::new(vec![Some(0)]))
        .await
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::Confirmed(QuizScore::new(1, 1)));
    assert_eq!(service.quiz().phase(), QuizPhase::Completed);
}
