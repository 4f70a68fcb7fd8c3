// ABOUTME: Integration tests for hooks system.
// ABOUTME: Tests configured commands, environment variable passing and failure reporting.

use bascule::hooks::{HookCommands, HookContext, HookPoint, HookRunner};
use bascule::types::{Color, ProjectName};
use std::fs;
use tempfile::TempDir;

fn test_context() -> HookContext {
    HookContext {
        project: ProjectName::new("erp").unwrap(),
        target: Color::Green,
        source: Some(Color::Blue),
        deployment_id: "20261016093000-4242-0".to_string(),
    }
}

fn runner(dir: &TempDir, commands: HookCommands) -> HookRunner {
    HookRunner::new(commands, dir.path())
}

/// Test: pre-deploy hook runs and its output is captured.
#[tokio::test]
async fn pre_deploy_hook_runs() {
    let temp_dir = TempDir::new().unwrap();
    let runner = runner(
        &temp_dir,
        HookCommands {
            pre_deploy: Some("echo 'pre-deploy ran'".to_string()),
            ..HookCommands::default()
        },
    );
    assert!(runner.hook_exists(HookPoint::PreDeploy));

    let result = runner
        .run(HookPoint::PreDeploy, &test_context())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.last_line(), Some("pre-deploy ran"));
}

/// Test: unconfigured hook points are skipped.
#[tokio::test]
async fn missing_hook_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let runner = runner(&temp_dir, HookCommands::default());

    assert!(!runner.hook_exists(HookPoint::PostDeploy));
    assert!(runner.run(HookPoint::PostDeploy, &test_context()).await.is_none());
}

/// Test: hooks run in the project directory with context in the environment.
#[tokio::test]
async fn hook_receives_environment_variables() {
    let temp_dir = TempDir::new().unwrap();
    let runner = runner(
        &temp_dir,
        HookCommands {
            post_deploy: Some(
                "echo \"$BASCULE_PROJECT $BASCULE_SOURCE_COLOR $BASCULE_TARGET_COLOR $BASCULE_DEPLOYMENT_ID\" > env.txt"
                    .to_string(),
            ),
            ..HookCommands::default()
        },
    );

    let result = runner
        .run(HookPoint::PostDeploy, &test_context())
        .await
        .unwrap();
    assert!(result.success);

    let content = fs::read_to_string(temp_dir.path().join("env.txt")).unwrap();
    assert_eq!(content.trim(), "erp blue green 20261016093000-4242-0");
}

/// Test: a failing hook reports its exit code and stderr.
#[tokio::test]
async fn failed_hook_reports_exit_code_and_stderr() {
    let temp_dir = TempDir::new().unwrap();
    let runner = runner(
        &temp_dir,
        HookCommands {
            on_error: Some("echo 'pg_dump: connection refused' >&2; exit 3".to_string()),
            ..HookCommands::default()
        },
    );

    let result = runner
        .run(HookPoint::OnError, &test_context())
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.exit_code, Some(3));
    assert!(result.stderr.contains("connection refused"));
}

/// Test: hooks never read the operator's terminal.
#[tokio::test]
async fn hook_stdin_is_closed() {
    let temp_dir = TempDir::new().unwrap();
    let runner = runner(
        &temp_dir,
        HookCommands {
            pre_deploy: Some("cat; echo done".to_string()),
            ..HookCommands::default()
        },
    );

    let result = runner
        .run(HookPoint::PreDeploy, &test_context())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.last_line(), Some("done"));
}

#[test]
fn hook_points_have_stable_names() {
    assert_eq!(HookPoint::PreDeploy.name(), "pre-deploy");
    assert_eq!(HookPoint::PostDeploy.name(), "post-deploy");
    assert_eq!(HookPoint::OnError.name(), "on-error");
}
