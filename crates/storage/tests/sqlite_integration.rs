use chrono::Duration;
use exam_core::model::{
    Answer, AttemptState, AttemptStatus, Exam, ExamDraft, ExamId, ExamResult, QuestionDraft,
    QuestionId, QuestionKind, Subject, UserId,
};
use exam_core::time::fixed_now;
use storage::repository::{ExamCatalog, ExamImport, ResultRepository, StorageError};
use storage::sqlite::SqliteRepository;

fn build_exam(id: &str, duration_seconds: u64) -> Exam {
    ExamDraft {
        id: id.into(),
        title: format!("Mock {id}"),
        duration_seconds,
        questions: vec![
            QuestionDraft {
                id: "q1".into(),
                kind: QuestionKind::SingleChoice,
                prompt: "Unit of force".into(),
                options: vec!["N".into(), "J".into(), "W".into()],
                correct_answer: Answer::single("N"),
                marks: 4.0,
                negative_marks: 1.0,
                subject: Subject::new("physics"),
            },
            QuestionDraft {
                id: "q2".into(),
                kind: QuestionKind::MultiChoice,
                prompt: "Noble gases".into(),
                options: vec!["He".into(), "Ne".into(), "O".into()],
                correct_answer: Answer::multiple(["He", "Ne"]),
                marks: 4.0,
                negative_marks: 2.0,
                subject: Subject::new("chemistry"),
            },
            QuestionDraft {
                id: "q3".into(),
                kind: QuestionKind::Numeric,
                prompt: "7 * 6".into(),
                options: Vec::new(),
                correct_answer: Answer::single("42"),
                marks: 3.0,
                negative_marks: 0.0,
                subject: Subject::new("maths"),
            },
        ],
        total_questions: None,
        total_marks: None,
    }
    .validate()
    .unwrap()
}

fn finished(exam: &Exam, elapsed: Duration) -> ExamResult {
    let start = fixed_now();
    let mut state = AttemptState::start(exam, false, start).unwrap();
    state
        .answer_question(exam, &QuestionId::new("q1").unwrap(), Answer::single("N"), start)
        .unwrap();
    state
        .answer_question(
            exam,
            &QuestionId::new("q2").unwrap(),
            Answer::multiple(["He"]),
            start,
        )
        .unwrap();
    state.submit(exam, start + elapsed).unwrap()
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_exam_roundtrip_keeps_question_order() {
    let repo = connect("memdb_exam_roundtrip").await;
    let exam = build_exam("jee-1", 600);
    repo.upsert_exam(&exam).await.unwrap();

    let fetched = repo.get_exam(exam.id()).await.unwrap();
    assert_eq!(fetched.title(), "Mock jee-1");
    assert_eq!(fetched.duration_seconds(), 600);
    assert_eq!(fetched.total_questions(), 3);
    assert!((fetched.total_marks() - 11.0).abs() < f64::EPSILON);
    let ids: Vec<&str> = fetched.questions().iter().map(|q| q.id().as_str()).collect();
    assert_eq!(ids, ["q1", "q2", "q3"]);
    assert_eq!(fetched.questions()[1].correct_answer(), &Answer::multiple(["Ne", "He"]));
    assert_eq!(fetched.questions()[2].options().len(), 0);

    assert!(matches!(
        repo.get_exam(&ExamId::new("missing").unwrap()).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_upsert_replaces_questions_and_lists_summaries() {
    let repo = connect("memdb_exam_upsert").await;
    repo.upsert_exam(&build_exam("b-exam", 300)).await.unwrap();
    repo.upsert_exam(&build_exam("a-exam", 120)).await.unwrap();
    // re-import with a new duration
    repo.upsert_exam(&build_exam("b-exam", 900)).await.unwrap();

    let listed = repo.list_exams().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id.as_str(), "a-exam");
    assert_eq!(listed[1].duration_seconds, 900);
    assert_eq!(listed[1].total_questions, 3);
    assert!((listed[1].total_marks - 11.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn sqlite_result_roundtrip_and_single_attempt() {
    let repo = connect("memdb_results").await;
    let exam = build_exam("neet-1", 600);
    repo.upsert_exam(&exam).await.unwrap();
    let user = UserId::new("student-1").unwrap();

    assert!(!repo.has_result(&user, exam.id()).await.unwrap());
    assert!(repo.get_result(&user, exam.id()).await.unwrap().is_none());

    let result = finished(&exam, Duration::seconds(90));
    repo.record_result(&user, &result).await.unwrap();
    assert!(repo.has_result(&user, exam.id()).await.unwrap());

    let stored = repo.get_result(&user, exam.id()).await.unwrap().unwrap();
    assert_eq!(stored.attempt_id(), result.attempt_id());
    assert_eq!(stored.status(), AttemptStatus::Submitted);
    assert_eq!(stored.started_at(), result.started_at());
    assert_eq!(stored.time_taken_seconds(), 90);
    assert_eq!(stored.correct_answers(), 1);
    assert_eq!(stored.wrong_answers(), 1);
    assert_eq!(stored.unattempted(), 1);
    assert!((stored.obtained_marks() - 2.0).abs() < 1e-9);
    assert_eq!(stored.subject_wise_score(), result.subject_wise_score());
    assert_eq!(stored.answers(), result.answers());

    // retrying the same attempt is accepted
    repo.record_result(&user, &result).await.unwrap();

    let second = finished(&exam, Duration::seconds(30));
    assert!(matches!(
        repo.record_result(&user, &second).await,
        Err(StorageError::Conflict)
    ));
    let still = repo.get_result(&user, exam.id()).await.unwrap().unwrap();
    assert_eq!(still.attempt_id(), result.attempt_id());
}

#[tokio::test]
async fn sqlite_lists_results_most_recent_first() {
    let repo = connect("memdb_result_list").await;
    let early = build_exam("early", 600);
    let late = build_exam("late", 600);
    let user = UserId::new("student-2").unwrap();

    // the later exam is over its deadline, so it is stored as expired
    repo.record_result(&user, &finished(&early, Duration::seconds(10)))
        .await
        .unwrap();
    repo.record_result(&user, &finished(&late, Duration::seconds(700)))
        .await
        .unwrap();

    let listed = repo.list_results(&user).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].exam_id().as_str(), "late");
    assert_eq!(listed[0].status(), AttemptStatus::Expired);
    assert_eq!(listed[0].time_taken_seconds(), 600);
    assert_eq!(listed[1].exam_id().as_str(), "early");

    let nobody = UserId::new("student-3").unwrap();
    assert!(repo.list_results(&nobody).await.unwrap().is_empty());
}
