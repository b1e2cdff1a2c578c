use std::sync::Arc;

use exam_core::model::{
    Answer, AttemptStatus, ExamDraft, ExamId, QuestionDraft, QuestionId, QuestionKind, Subject,
    UserId,
};
use exam_core::time::fixed_now;
use services::{AnswerOutcome, Clock, ExamWorkflow, SessionError};
use storage::repository::{ExamImport, InMemoryRepository, ResultRepository, Storage};

fn question(
    id: &str,
    kind: QuestionKind,
    options: &[&str],
    correct: Answer,
    subject: &str,
) -> QuestionDraft {
    QuestionDraft {
        id: id.into(),
        kind,
        prompt: format!("question {id}"),
        options: options.iter().map(|o| (*o).to_string()).collect(),
        correct_answer: correct,
        marks: 4.0,
        negative_marks: 1.0,
        subject: Subject::new(subject),
    }
}

fn mock_exam() -> exam_core::model::Exam {
    ExamDraft {
        id: "full-mock".into(),
        title: "Full Mock".into(),
        duration_seconds: 1800,
        questions: vec![
            question(
                "p1",
                QuestionKind::SingleChoice,
                &["A", "B", "C"],
                Answer::single("B"),
                "physics",
            ),
            question(
                "c1",
                QuestionKind::MultiChoice,
                &["A", "B", "C"],
                Answer::multiple(["A", "C"]),
                "chemistry",
            ),
            question("m1", QuestionKind::Numeric, &[], Answer::single("12"), "maths"),
            question(
                "m2",
                QuestionKind::SingleChoice,
                &["X", "Y"],
                Answer::single("Y"),
                "maths",
            ),
        ],
        total_questions: Some(4),
        total_marks: Some(16.0),
    }
    .validate()
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn exam_flow_grades_and_persists_once() {
    let repo = InMemoryRepository::new();
    repo.upsert_exam(&mock_exam()).await.unwrap();
    let workflow = ExamWorkflow::new(
        Clock::manual(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    );
    let user = UserId::new("student").unwrap();
    let exam_id = ExamId::new("full-mock").unwrap();
    let q = |id: &str| QuestionId::new(id).unwrap();

    let session = workflow.start_exam(&user, &exam_id).await.unwrap();
    session.answer_question(&q("p1"), Answer::single("A")).unwrap();
    // overwrite is allowed
    session.answer_question(&q("p1"), Answer::single("B")).unwrap();
    session
        .answer_question(&q("c1"), Answer::multiple(["C", "A"]))
        .unwrap();
    session.answer_question(&q("m1"), Answer::single("13")).unwrap();

    let shape = session
        .answer_question(&q("m2"), Answer::multiple(["Y"]))
        .unwrap_err();
    assert!(matches!(shape, SessionError::Attempt(_)));

    let result = workflow.submit(&user, &session).await.unwrap();
    assert_eq!(result.status(), AttemptStatus::Submitted);
    assert_eq!(result.correct_answers(), 2);
    assert_eq!(result.wrong_answers(), 1);
    assert_eq!(result.unattempted(), 1);
    assert!((result.obtained_marks() - 7.0).abs() < 1e-9);
    assert!((result.percentage() - 43.75).abs() < 1e-9);

    let maths = result
        .subject_wise_score()
        .get(&Subject::new("maths"))
        .unwrap();
    assert_eq!(maths.total, 2);
    assert_eq!(maths.correct, 0);
    assert!((maths.marks + 1.0).abs() < 1e-9);

    assert!(repo.has_result(&user, &exam_id).await.unwrap());
    assert!(workflow.available_exams(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_backed_workflow_expires_late_answer() {
    let storage = Storage::sqlite("sqlite:file:memdb_services_smoke?mode=memory&cache=shared")
        .await
        .expect("sqlite storage");
    storage.import.upsert_exam(&mock_exam()).await.unwrap();
    let clock = Clock::manual(fixed_now());
    let workflow = ExamWorkflow::from_storage(clock.clone(), &storage);
    let user = UserId::new("late-student").unwrap();
    let exam_id = ExamId::new("full-mock").unwrap();
    let m1 = QuestionId::new("m1").unwrap();

    let session = workflow.start_exam(&user, &exam_id).await.unwrap();
    session.answer_question(&m1, Answer::single("12")).unwrap();
    let mut advancing = clock;
    advancing.advance(chrono::Duration::minutes(45));

    let outcome = workflow
        .answer(&user, &session, &m1, Answer::single("11"))
        .await
        .unwrap();
    let AnswerOutcome::Expired(result) = outcome else {
        panic!("late answer should expire the attempt");
    };

    assert_eq!(result.status(), AttemptStatus::Expired);
    assert_eq!(result.time_taken_seconds(), 1800);
    assert!((result.obtained_marks() - 4.0).abs() < 1e-9);

    let stored = workflow.results(&user).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].attempt_id(), result.attempt_id());
}
