use chrono::Duration;
use quiz_core::model::{
    AnswerMap, AttemptConfig, AttemptStatus, CourseId, EnrollmentId, NewAttempt, QuestionId,
    Selection, StudentId, TopicContent, TopicId,
};
use quiz_core::session::{QuizSession, SessionKey};
use quiz_core::time::fixed_now;
use storage::repository::{
    AttemptRepository, Enrollment, EnrollmentRepository, SessionStore, StorageError, TopicRecord,
    TopicRepository,
};
use storage::sqlite::SqliteRepository;

const CONTENT: &str = r#"{
    "reading": "Plants make food from light.",
    "questions": [
        {"id": "q1", "text": "What do plants need?", "options": ["Light", "Sand"], "correct_answer_index": 0},
        {"id": 2, "text": "Where does it happen?", "options": ["Roots", "Leaves", "Seeds"], "correct_answer_index": 1}
    ]
}"#;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

async fn seed_topic_and_enrollment(repo: &SqliteRepository) -> (TopicRecord, Enrollment) {
    let topic = TopicRecord {
        id: TopicId::new(1),
        course_id: CourseId::new(7),
        title: "Photosynthesis".into(),
        content: CONTENT.into(),
        config: AttemptConfig::new(true, false, Some(3), 60)
            .unwrap()
            .with_time_limit_secs(Some(600))
            .unwrap(),
    };
    repo.upsert_topic(&topic).await.unwrap();

    let enrollment = Enrollment {
        id: EnrollmentId::new(11),
        student_id: StudentId::new(5),
        course_id: CourseId::new(7),
    };
    repo.upsert_enrollment(&enrollment).await.unwrap();
    (topic, enrollment)
}

fn new_attempt(enrollment: &Enrollment, number: u32, percentage: u8) -> NewAttempt {
    let mut answers = AnswerMap::new();
    answers.insert(QuestionId::new("q1"), Selection::new(0, "Light"));
    let finished = fixed_now() + Duration::minutes(i64::from(number));
    NewAttempt {
        topic_id: TopicId::new(1),
        enrollment_id: enrollment.id,
        student_id: enrollment.student_id,
        attempt_number: number,
        session_seed: None,
        started_at: finished - Duration::seconds(42),
        finished_at: finished,
        time_used_seconds: 42,
        answers,
        raw_score: 1,
        total_questions: 2,
        percentage,
        status: AttemptStatus::Completed,
    }
}

#[tokio::test]
async fn topic_roundtrip_keeps_raw_content_and_config() {
    let repo = connect("memdb_topic_roundtrip").await;
    let (topic, _) = seed_topic_and_enrollment(&repo).await;

    let fetched = repo.get_topic(topic.id).await.unwrap().expect("topic");
    assert_eq!(fetched, topic);
    let parsed = TopicContent::parse(&fetched.content).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed.questions()[1].id().as_str(), "2");

    assert!(repo.get_topic(TopicId::new(99)).await.unwrap().is_none());
}

#[tokio::test]
async fn enrollment_resolves_by_student_and_course() {
    let repo = connect("memdb_enrollment_resolve").await;
    let (_, enrollment) = seed_topic_and_enrollment(&repo).await;

    let resolved = repo
        .resolve_enrollment(StudentId::new(5), CourseId::new(7))
        .await
        .unwrap();
    assert_eq!(resolved, Some(enrollment));
    assert!(
        repo.resolve_enrollment(StudentId::new(5), CourseId::new(8))
            .await
            .unwrap()
            .is_none()
    );

    let clash = Enrollment {
        id: EnrollmentId::new(12),
        ..enrollment
    };
    let err = repo.upsert_enrollment(&clash).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
}

#[tokio::test]
async fn attempt_number_is_unique_per_topic_and_enrollment() {
    let repo = connect("memdb_attempt_unique").await;
    let (topic, enrollment) = seed_topic_and_enrollment(&repo).await;

    let first = repo
        .insert_attempt(new_attempt(&enrollment, 1, 50))
        .await
        .unwrap();
    let err = repo
        .insert_attempt(new_attempt(&enrollment, 1, 100))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let kept = repo.get_attempt(first.id).await.unwrap().expect("attempt");
    assert_eq!(kept.percentage, 50);
    assert_eq!(kept, first);
    assert_eq!(repo.count_attempts(topic.id, enrollment.id).await.unwrap(), 1);
}

#[tokio::test]
async fn session_seed_allows_one_attempt_per_session() {
    let repo = connect("memdb_attempt_session_seed").await;
    let (topic, enrollment) = seed_topic_and_enrollment(&repo).await;

    // Seeds above i64::MAX must survive the round trip.
    let seed = u64::MAX - 3;
    let first = repo
        .insert_attempt(NewAttempt {
            session_seed: Some(seed),
            ..new_attempt(&enrollment, 1, 50)
        })
        .await
        .unwrap();
    let err = repo
        .insert_attempt(NewAttempt {
            session_seed: Some(seed),
            ..new_attempt(&enrollment, 2, 100)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    repo.insert_attempt(new_attempt(&enrollment, 2, 60))
        .await
        .unwrap();
    repo.insert_attempt(new_attempt(&enrollment, 3, 70))
        .await
        .unwrap();

    let found = repo
        .find_attempt_for_session(topic.id, enrollment.id, seed)
        .await
        .unwrap()
        .expect("attempt for session");
    assert_eq!(found, first);
    assert_eq!(found.session_seed, Some(seed));
    assert!(
        repo.find_attempt_for_session(topic.id, enrollment.id, 1)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(repo.count_attempts(topic.id, enrollment.id).await.unwrap(), 3);
}

#[tokio::test]
async fn attempts_list_in_order_and_keep_answers() {
    let repo = connect("memdb_attempt_list").await;
    let (topic, enrollment) = seed_topic_and_enrollment(&repo).await;

    for (n, pct) in [(1, 50), (2, 100), (3, 0)] {
        repo.insert_attempt(new_attempt(&enrollment, n, pct))
            .await
            .unwrap();
    }

    let all = repo.list_attempts(topic.id).await.unwrap();
    let numbers: Vec<_> = all.iter().map(|a| a.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(
        all[0].answers.get(&QuestionId::new("q1")),
        Some(&Selection::new(0, "Light"))
    );

    let own = repo
        .list_attempts_for_enrollment(topic.id, enrollment.id)
        .await
        .unwrap();
    assert_eq!(own.len(), 3);
    let second = repo
        .find_attempt(topic.id, enrollment.id, 2)
        .await
        .unwrap()
        .expect("second attempt");
    assert_eq!(second.percentage, 100);
}

#[tokio::test]
async fn session_store_roundtrip_and_clear() {
    let repo = connect("memdb_session_store").await;
    let (topic, enrollment) = seed_topic_and_enrollment(&repo).await;
    let content = TopicContent::parse(&topic.content).unwrap();

    let mut session = QuizSession::new(
        topic.id,
        enrollment.id,
        enrollment.student_id,
        &content,
        &topic.config,
        42,
    );
    session
        .select_answer(&content, &QuestionId::new("2"), 1, "Leaves", fixed_now())
        .unwrap();
    session.advance();
    repo.save_session(&session).await.unwrap();

    let key = SessionKey::new(enrollment.id, topic.id);
    let loaded = repo.load_session(key).await.unwrap().expect("session");
    assert_eq!(loaded, session);

    session.advance();
    repo.save_session(&session).await.unwrap();
    let reloaded = repo.load_session(key).await.unwrap().expect("session");
    assert_eq!(reloaded.cursor(), session.cursor());

    repo.clear_session(key).await.unwrap();
    assert!(repo.load_session(key).await.unwrap().is_none());
    repo.clear_session(key).await.unwrap();
}
