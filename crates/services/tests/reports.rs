use chrono::Duration;
use quiz_core::model::{
    AttemptConfig, AttemptId, CourseId, EnrollmentId, QuestionId, StudentId, TopicId,
};
use quiz_core::time::fixed_now;
use services::{AssessmentServices, Clock, ReportError, SubmitOutcome};
use storage::repository::{Enrollment, TopicRecord};

const CONTENT: &str = r#"{"questions":[
    {"id":"a","text":"1+1","options":["2","3"],"correct_answer_index":0},
    {"id":"b","text":"2+2","options":["4","5"],"correct_answer_index":0}
]}"#;

async fn setup(services: &AssessmentServices) {
    let storage = services.storage();
    storage
        .topics
        .upsert_topic(&TopicRecord {
            id: TopicId::new(1),
            course_id: CourseId::new(1),
            title: "Arithmetic".into(),
            content: CONTENT.into(),
            config: AttemptConfig::new(false, false, None, 70).unwrap(),
        })
        .await
        .unwrap();
    for s in 1..=2 {
        storage
            .enrollments
            .upsert_enrollment(&Enrollment {
                id: EnrollmentId::new(s),
                student_id: StudentId::new(s),
                course_id: CourseId::new(1),
            })
            .await
            .unwrap();
    }
}

/// Runs one attempt answering the first `correct` questions right.
async fn take_attempt(services: &AssessmentServices, student: u64, correct: usize) -> AttemptId {
    let svc = services.session_loop();
    let mut active = svc
        .start_or_resume(TopicId::new(1), EnrollmentId::new(student))
        .await
        .unwrap();
    if active.session().is_completed() {
        svc.retry(&mut active).await.unwrap();
    }
    for (i, id) in ["a", "b"].iter().enumerate() {
        // options are not shuffled: index 0 is right, index 1 is wrong
        let shown = usize::from(i >= correct);
        svc.select_answer(&mut active, &QuestionId::new(*id), shown)
            .await
            .unwrap();
    }
    match svc.submit(&mut active).await.unwrap() {
        SubmitOutcome::Completed(attempt) => attempt.id,
        SubmitOutcome::InFlight => panic!("unexpected in-flight submit"),
    }
}

#[tokio::test]
async fn topic_report_aggregates_completed_attempts() {
    let services = AssessmentServices::in_memory(Clock::fixed(fixed_now()));
    setup(&services).await;

    take_attempt(&services, 1, 1).await;
    let best = take_attempt(&services, 1, 2).await;
    take_attempt(&services, 2, 0).await;

    let report = services.reports().topic_report(TopicId::new(1)).await.unwrap();
    assert_eq!(report.title, "Arithmetic");
    assert_eq!(report.pass_threshold, 70);
    assert_eq!(report.overall.total_students, 2);
    assert_eq!(report.overall.total_attempts, 3);
    assert_eq!(report.overall.max_percentage, 100);
    assert_eq!(report.overall.min_percentage, 0);
    assert!((report.overall.average_percentage - 50.0).abs() < 1e-9);
    assert_eq!(report.overall.passed_count, 1);
    assert_eq!(report.overall.failed_count, 2);

    assert_eq!(report.students.len(), 2);
    let first = &report.students[0];
    assert_eq!(first.student_id, StudentId::new(1));
    assert_eq!(first.total_attempts, 2);
    assert_eq!(first.best_attempt_id, best);
    assert_eq!(first.best_percentage, 100);
    assert!((first.average_percentage - 75.0).abs() < 1e-9);

    let history = services
        .reports()
        .attempt_history(TopicId::new(1), EnrollmentId::new(1))
        .await
        .unwrap();
    let numbers: Vec<_> = history.iter().map(|a| a.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2]);

    let fetched = services.reports().get_attempt(best).await.unwrap();
    assert_eq!(fetched.percentage, 100);
}

#[tokio::test]
async fn empty_topic_reports_zeroes_and_unknown_ids_error() {
    let services = AssessmentServices::new_sqlite(
        "sqlite:file:memdb_reports_empty?mode=memory&cache=shared",
        Clock::fixed(fixed_now() + Duration::days(1)),
    )
    .await
    .expect("sqlite services");
    setup(&services).await;

    let overall = services
        .reports()
        .overall_stats(TopicId::new(1))
        .await
        .unwrap();
    assert_eq!(overall.total_attempts, 0);
    assert!(overall.average_percentage.abs() < f64::EPSILON);
    assert!(
        services
            .reports()
            .student_stats(TopicId::new(1))
            .await
            .unwrap()
            .is_empty()
    );

    let err = services
        .reports()
        .overall_stats(TopicId::new(9))
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::TopicNotFound(_)));
    let err = services
        .reports()
        .get_attempt(AttemptId::new(77))
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::AttemptNotFound(_)));
}

#[tokio::test]
async fn sqlite_backed_flow_records_attempts() {
    let services = AssessmentServices::new_sqlite(
        "sqlite:file:memdb_reports_flow?mode=memory&cache=shared",
        Clock::fixed(fixed_now()),
    )
    .await
    .expect("sqlite services");
    setup(&services).await;

    let id = take_attempt(&services, 2, 2).await;
    let again = take_attempt(&services, 2, 1).await;
    assert_ne!(id, again);

    let stats = services
        .reports()
        .student_stats(TopicId::new(1))
        .await
        .unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].best_attempt_id, id);
    assert_eq!(stats[0].latest_attempt_id, again);
    assert_eq!(stats[0].passed_count, 1);
    assert_eq!(stats[0].failed_count, 1);
}
