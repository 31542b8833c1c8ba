use std::sync::Arc;

use uuid::Uuid;

use gavel::judge::{compile, grade};
use gavel::{
    Config, Judge, LanguageProfile, MemoryStore, ResourceLimits, SlotPool, Submission, TestCase,
    Verdict,
};

use super::test_config;

fn inline_submission(run_cmd: &str, stdin: &str, expected: &str) -> Submission {
    Submission {
        submission_id: Uuid::new_v4(),
        problem_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        language: "inline".to_owned(),
        source_code: String::new(),
        source_file_name: None,
        time_limit: Some(1.0),
        wall_time_limit: Some(2.0),
        memory_limit: None,
        stack_limit: None,
        output_limit: None,
        stdin: Some(stdin.to_owned()),
        stdout: Some(expected.to_owned()),
        compile_cmd: None,
        run_cmd: Some(run_cmd.to_owned()),
        callback_url: None,
        reply_to: None,
    }
}

fn judge(config: Config, slots: u32) -> Judge<MemoryStore> {
    let config = Arc::new(config);
    let pool = Arc::new(SlotPool::new(
        80,
        slots,
        config.isolate_binary(),
        config.cgroup,
    ));
    Judge::new(config, pool, MemoryStore::new())
}

#[tokio::test]
#[ignore = "requires isolate and root"]
async fn cat_round_trip_is_accepted() {
    let judge = judge(test_config(), 1);
    let submission = inline_submission("cat", "5\n", "5\n");

    let report = judge.process(&submission).await;

    assert_eq!(report.result, Verdict::Accepted);
    assert_eq!(report.message, "Accepted");
    assert!(report.wrong_answers.is_empty());
    assert!(report.compile_output.is_empty());
}

#[tokio::test]
#[ignore = "requires isolate and root"]
async fn sleeping_past_wall_limit_is_tle() {
    let judge = judge(test_config(), 1);
    let submission = inline_submission("sleep 30", "", "");

    let report = judge.process(&submission).await;

    assert_eq!(report.result, Verdict::TimeLimitExceeded);
    assert_eq!(report.message, "Time Limit Exceeded");
    assert!(report.wrong_answers.is_empty());
}

#[tokio::test]
#[ignore = "requires isolate and root"]
async fn wrong_output_reports_one_wrong_answer() {
    let judge = judge(test_config(), 1);
    let submission = inline_submission("echo 4", "", "5\n");

    let report = judge.process(&submission).await;

    assert_eq!(report.result, Verdict::WrongAnswer);
    assert_eq!(report.wrong_answers.len(), 1);
    assert_eq!(report.wrong_answers[0].stdout, "4\n");
    assert_eq!(report.wrong_answers[0].test_case_id, submission.submission_id);
}

#[tokio::test]
#[ignore = "requires isolate and root"]
async fn stderr_output_fails_the_test() {
    let judge = judge(test_config(), 1);
    // Correct stdout, but stderr is not empty
    let submission = inline_submission("echo 5; echo noise >&2", "", "5\n");

    let report = judge.process(&submission).await;

    assert_eq!(report.result, Verdict::WrongAnswer);
    assert_eq!(report.stderr, "noise\n");
}

#[tokio::test]
#[ignore = "requires isolate and root"]
async fn nonzero_exit_is_runtime_error() {
    let judge = judge(test_config(), 1);
    let submission = inline_submission("exit 3", "", "");

    let report = judge.process(&submission).await;

    assert_eq!(report.result, Verdict::RuntimeError);
    assert_eq!(report.exit_code, Some(3));
}

#[tokio::test]
#[ignore = "requires isolate and root"]
async fn grading_stops_at_first_mismatch() {
    let config = test_config();
    let pool = SlotPool::new(85, 1, config.isolate_binary(), config.cgroup);
    let sandbox = pool.acquire().await.unwrap();

    let profile = LanguageProfile {
        name: "cat".to_owned(),
        source_name: "main.txt".to_owned(),
        compile_command: None,
        run_command: "cat".to_owned(),
        limits: None,
    };
    sandbox.stage(&profile.source_name, b"").await.unwrap();

    let problem_id = Uuid::new_v4();
    let case = |input: &str, output: &str| TestCase {
        id: Uuid::new_v4(),
        problem_id,
        input: input.to_owned(),
        output: output.to_owned(),
    };
    // Test 2 is the first mismatch; test 3 must never run
    let tests = vec![case("1\n", "1\n"), case("2\n", "9\n"), case("3\n", "3\n")];

    let limits = ResourceLimits::default();
    let outcome = grade(&sandbox, &config, &profile, &limits, &tests)
        .await
        .unwrap();

    assert_eq!(outcome.verdict, Verdict::WrongAnswer);
    assert_eq!(outcome.executed, 2);
    let wrong = outcome.wrong_answer.unwrap();
    assert_eq!(wrong.test_case_id, tests[1].id);
    assert_eq!(wrong.stdout, "2\n");

    let mut sandbox = sandbox;
    sandbox.release().await.unwrap();
}

#[tokio::test]
#[ignore = "requires isolate and root"]
async fn interpreted_profile_skips_the_compile_stage() {
    let config = test_config();
    let pool = SlotPool::new(86, 1, config.isolate_binary(), config.cgroup);
    let sandbox = pool.acquire().await.unwrap();

    let profile = LanguageProfile {
        name: "cat".to_owned(),
        source_name: "main.txt".to_owned(),
        compile_command: None,
        run_command: "cat main.txt".to_owned(),
        limits: None,
    };
    sandbox.stage(&profile.source_name, b"src").await.unwrap();

    let outcome = compile(&sandbox, &config, &profile).await.unwrap();
    assert!(outcome.succeeded());
    assert!(outcome.metadata.is_none(), "no executor invocation happened");

    let mut sandbox = sandbox;
    sandbox.release().await.unwrap();
}

#[tokio::test]
#[ignore = "requires isolate and root"]
async fn failing_compile_command_is_compile_error() {
    let judge = judge(test_config(), 1);
    let mut submission = inline_submission("./main", "", "");
    submission.compile_cmd = Some("echo broken >&2; exit 1".to_owned());

    let report = judge.process(&submission).await;

    assert_eq!(report.result, Verdict::CompileError);
    assert!(report.compile_output.contains("broken"));
    assert!(report.wrong_answers.is_empty());
}

#[tokio::test]
#[ignore = "requires isolate and root"]
async fn same_submission_grades_identically() {
    let judge = judge(test_config(), 1);
    let submission = inline_submission("cat", "idempotent\n", "idempotent\n");

    let first = judge.process(&submission).await;
    let second = judge.process(&submission).await;

    assert_eq!(first.result, Verdict::Accepted);
    assert_eq!(first.result, second.result);
}
