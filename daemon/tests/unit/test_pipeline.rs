//! Deployment pipeline tests against a scripted command runner

mod common;

use std::sync::Arc;

use common::{provision, request, test_env, test_settings, FakeRunner, RecordingNotifier};
use deployhook::deploy::archive::copy_client_archive;
use deployhook::deploy::pipeline::run_pipeline;
use deployhook::deploy::report::{Stage, StageStatus};
use deployhook::deploy::runner::CommandSpec;
use deployhook::deploy::update::pull_update;
use deployhook::errors::{ClassifyError, ExtractError, PipelineError};
use deployhook::models::deployment::UpdateRequest;
use deployhook::webhook::classify::Classification;
use deployhook::workers::deployer::Deployer;

#[tokio::test]
async fn test_full_run_with_existing_checkout() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    let working = provision(&settings, "shop", "prod", true);
    let runner = Arc::new(FakeRunner::new());
    let env = test_env(&settings, runner.clone());

    let report = run_pipeline(&request("shop", "main", "prod"), &env)
        .await
        .unwrap();

    assert_eq!(
        runner.lines(),
        vec![
            "git checkout main",
            "git pull",
            "git checkout main",
            "docker-compose build",
            "docker-compose run --rm app pytest -k server tests/",
            "docker-compose down --remove-orphans",
            "docker-compose up -d",
            "docker image prune -f",
        ]
    );
    assert!(working.join("shop").join(".env").is_file());
    assert!(report.is_success());
    assert_eq!(report.status_of(Stage::Pull), Some(StageStatus::Ok));
    assert_eq!(report.status_of(Stage::Cleanup), Some(StageStatus::Ok));
    assert!(report.render().starts_with("Container: shop-prod-1.2.3\n[build:45]\n[version:1.2.3]"));

    let build = runner
        .calls()
        .into_iter()
        .find(|c| c.args == ["build"])
        .unwrap();
    assert_eq!(build.env_value("VERSION"), Some("prod-1.2.3"));
    assert_eq!(build.env_value("APPNAME"), Some("shop"));
    assert_eq!(build.cwd.as_deref(), Some(working.join("shop").as_path()));
}

#[tokio::test]
async fn test_missing_checkout_is_cloned() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    let working = provision(&settings, "shop", "dev", false);
    let checkout = working.join("shop");
    let clone_target = checkout.clone();
    let runner = Arc::new(FakeRunner::new().on_run("git clone", move |_: &CommandSpec| {
        std::fs::create_dir_all(&clone_target).unwrap()
    }));
    let env = test_env(&settings, runner.clone());

    let report = run_pipeline(&request("shop", "dev", "dev"), &env)
        .await
        .unwrap();

    assert_eq!(
        runner.lines()[0],
        format!("git clone -b dev -- git@github.com:acme/shop.git {}", checkout.display())
    );
    assert_eq!(runner.count("git pull"), 0);
    assert_eq!(report.status_of(Stage::Clone), Some(StageStatus::Ok));
}

#[tokio::test]
async fn test_build_fails_once_then_succeeds() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "shop", "prod", true);
    let runner = Arc::new(FakeRunner::new().fail("docker-compose build", 1));
    let env = test_env(&settings, runner.clone());

    let report = run_pipeline(&request("shop", "main", "prod"), &env)
        .await
        .unwrap();

    assert_eq!(runner.count("docker-compose build"), 2);
    assert_eq!(runner.count("up -d"), 1);
    assert!(report.is_success());
    assert_eq!(report.status_of(Stage::Build), Some(StageStatus::Ok));
    assert!(report.render().contains("Build: WARNING (attempt 1/2 failed"));
}

#[tokio::test]
async fn test_build_fails_twice() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "shop", "prod", true);
    let runner = Arc::new(FakeRunner::new().fail("docker-compose build", 2));
    let env = test_env(&settings, runner.clone());

    let failure = run_pipeline(&request("shop", "main", "prod"), &env)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, PipelineError::BuildError(_)));
    assert_eq!(runner.count("docker-compose build"), 2);
    assert_eq!(runner.count("pytest"), 0);
    assert_eq!(runner.count("down"), 0);
    assert_eq!(failure.report.status_of(Stage::Build), Some(StageStatus::Failed));
    assert!(failure.report.render().contains("Error: Build error:"));
}

#[tokio::test]
async fn test_build_timeout_is_not_retried() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "shop", "prod", true);
    let runner = Arc::new(FakeRunner::new().time_out("docker-compose build"));
    let env = test_env(&settings, runner.clone());

    let failure = run_pipeline(&request("shop", "main", "prod"), &env)
        .await
        .unwrap_err();

    assert!(matches!(
        &failure.error,
        PipelineError::CommandTimeout { stage, .. } if stage == "Build"
    ));
    assert_eq!(runner.count("docker-compose build"), 1);
}

#[tokio::test]
async fn test_failed_tests_leave_running_containers() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "shop", "prod", true);
    let runner = Arc::new(FakeRunner::new().fail("pytest", 1));
    let env = test_env(&settings, runner.clone());

    let failure = run_pipeline(&request("shop", "main", "prod"), &env)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, PipelineError::TestError(_)));
    assert_eq!(runner.count("down --remove-orphans"), 0);
    assert_eq!(runner.count("up -d"), 0);
    assert_eq!(runner.count("prune"), 0);
}

#[tokio::test]
async fn test_migration_runs_only_when_requested() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "shop", "prod", true);

    let runner = Arc::new(FakeRunner::new());
    let env = test_env(&settings, runner.clone());
    run_pipeline(&request("shop", "main", "prod"), &env)
        .await
        .unwrap();
    assert_eq!(runner.count("alembic"), 0);

    let runner = Arc::new(FakeRunner::new());
    let env = test_env(&settings, runner.clone());
    let mut migrating = request("shop", "main", "prod");
    migrating.do_migration = true;
    let report = run_pipeline(&migrating, &env).await.unwrap();

    let migrate = runner
        .position("docker-compose run --rm app alembic upgrade head")
        .unwrap();
    let test = runner.position("pytest").unwrap();
    assert!(migrate < test);
    assert_eq!(report.status_of(Stage::Migrate), Some(StageStatus::Ok));
}

#[tokio::test]
async fn test_failed_migration_stops_before_tests() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "shop", "prod", true);
    let runner = Arc::new(FakeRunner::new().fail("alembic", 1));
    let env = test_env(&settings, runner.clone());
    let mut migrating = request("shop", "main", "prod");
    migrating.do_migration = true;

    let failure = run_pipeline(&migrating, &env).await.unwrap_err();

    assert!(matches!(failure.error, PipelineError::MigrationError(_)));
    assert_eq!(runner.count("pytest"), 0);
}

#[tokio::test]
async fn test_missing_working_directory() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    let runner = Arc::new(FakeRunner::new());
    let env = test_env(&settings, runner.clone());

    let failure = run_pipeline(&request("shop", "main", "prod"), &env)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, PipelineError::PrepareError(_)));
    assert!(runner.calls().is_empty());
    assert!(!settings.deploy.deploy_root.join("shop").exists());
}

#[tokio::test]
async fn test_unknown_application_is_not_deployable() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "blog", "prod", true);
    let runner = Arc::new(FakeRunner::new());
    let env = test_env(&settings, runner.clone());

    let failure = run_pipeline(&request("blog", "main", "prod"), &env)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, PipelineError::NotDeployable(_)));
    assert!(!failure.error.is_reportable());
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_unsafe_branch_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "shop", "prod", true);
    let runner = Arc::new(FakeRunner::new());
    let env = test_env(&settings, runner.clone());

    let failure = run_pipeline(&request("shop", "--upload-pack=x", "prod"), &env)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, PipelineError::PrepareError(_)));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_option_shaped_clone_url_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "shop", "dev", false);
    let runner = Arc::new(FakeRunner::new());
    let env = test_env(&settings, runner.clone());
    let mut request = request("shop", "dev", "dev");
    request.ssh_url = "--upload-pack=touch /tmp/pwned".to_string();

    let failure = run_pipeline(&request, &env).await.unwrap_err();

    assert!(matches!(failure.error, PipelineError::PrepareError(_)));
    assert_eq!(failure.report.status_of(Stage::Prepare), Some(StageStatus::Failed));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_clone_url_of_another_repository_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "shop", "prod", true);
    let runner = Arc::new(FakeRunner::new());
    let env = test_env(&settings, runner.clone());
    let mut request = request("shop", "main", "prod");
    request.ssh_url = "git@evil.example:acme/shop.git".to_string();

    let failure = run_pipeline(&request, &env).await.unwrap_err();

    assert!(matches!(failure.error, PipelineError::PrepareError(_)));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_cleanup_failure_is_only_a_warning() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "shop", "prod", true);
    let runner = Arc::new(FakeRunner::new().fail("prune", 1));
    let env = test_env(&settings, runner.clone());

    let report = run_pipeline(&request("shop", "main", "prod"), &env)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.status_of(Stage::Cleanup), Some(StageStatus::Warning));
}

#[tokio::test]
async fn test_replay_produces_an_equivalent_report() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "shop", "prod", true);
    let runner = Arc::new(FakeRunner::new());
    let env = test_env(&settings, runner.clone());
    let request = request("shop", "main", "prod");

    let first = run_pipeline(&request, &env).await.unwrap();
    let calls = runner.calls().len();
    let second = run_pipeline(&request, &env).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(runner.calls().len(), calls * 2);
}

#[tokio::test]
async fn test_archive_path_copies_files_without_compose() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    let runner = Arc::new(FakeRunner::new().on_run("git clone", |spec: &CommandSpec| {
        let checkout = std::path::PathBuf::from(spec.args.last().unwrap());
        std::fs::create_dir_all(checkout.join("archive")).unwrap();
        std::fs::write(checkout.join("archive").join("app.zip"), "zip").unwrap();
        std::fs::write(checkout.join("README.md"), "readme").unwrap();
    }));
    let env = test_env(&settings, runner.clone());

    let report = copy_client_archive(&request("shop_client", "main", "prod"), &env)
        .await
        .unwrap();

    assert_eq!(runner.count("docker"), 0);
    assert_eq!(runner.count("git clone -- git@github.com:acme/shop_client.git"), 1);
    assert_eq!(runner.count("git checkout main"), 1);
    assert!(report.render().starts_with("Files shop_client-prod-45 copied"));

    let client_dir = settings.deploy.clients_dir.join("shop_client");
    assert!(client_dir.join("app.zip").is_file());
    assert!(client_dir.join("README.md").is_file());

    // Only the client directory and the command log are left behind
    let leftovers: Vec<_> = std::fs::read_dir(&settings.deploy.clients_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|name| name.starts_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_archive_failure_removes_temp_dir() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    let runner = Arc::new(FakeRunner::new().fail("git clone", 1));
    let env = test_env(&settings, runner.clone());

    let failure = copy_client_archive(&request("shop_client", "main", "prod"), &env)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, PipelineError::BuildError(_)));
    assert!(failure.report.render().contains("[build:45]"));
    assert_eq!(runner.count("git checkout"), 0);
    let temp_dirs = std::fs::read_dir(&settings.deploy.clients_dir)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .starts_with(".tmp")
        })
        .count();
    assert_eq!(temp_dirs, 0);
}

#[tokio::test]
async fn test_archive_rejects_option_shaped_clone_url() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    let runner = Arc::new(FakeRunner::new());
    let env = test_env(&settings, runner.clone());
    let mut request = request("shop_client", "main", "prod");
    request.ssh_url = "--upload-pack=touch /tmp/pwned".to_string();

    let failure = copy_client_archive(&request, &env).await.unwrap_err();

    assert!(matches!(failure.error, PipelineError::PrepareError(_)));
    assert!(failure.report.render().contains("[build:45]"));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_archive_requires_known_client() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    let runner = Arc::new(FakeRunner::new());
    let env = test_env(&settings, runner.clone());

    let failure = copy_client_archive(&request("other_client", "main", "prod"), &env)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, PipelineError::NotDeployable(_)));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_update_pulls_own_checkout() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    std::fs::create_dir_all(root.path().join("self")).unwrap();
    std::fs::create_dir_all(&settings.deploy.deploy_root).unwrap();
    let runner = Arc::new(FakeRunner::new());
    let env = test_env(&settings, runner.clone());

    let report = pull_update(
        &UpdateRequest {
            repository_name: "deployhook".to_string(),
            branch: "main".to_string(),
        },
        &env,
    )
    .await
    .unwrap();

    assert_eq!(runner.lines(), vec!["git checkout main", "git pull"]);
    let calls = runner.calls();
    assert_eq!(calls[1].cwd.as_deref(), Some(root.path().join("self").as_path()));
    assert_eq!(report.status_of(Stage::Update), Some(StageStatus::Ok));
}

#[tokio::test]
async fn test_deployer_notifies_exactly_once() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "shop", "prod", true);
    let runner = Arc::new(FakeRunner::new().fail("pytest", 1));
    let notifier = Arc::new(RecordingNotifier::new());
    let deployer = Deployer::new(test_env(&settings, runner.clone()), notifier.clone());

    deployer
        .handle(Ok(Classification::Deploy(request("shop", "main", "prod"))))
        .await;

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Tests: FAILED"));
    assert!(messages[0].contains("Error: Test error:"));
}

#[tokio::test]
async fn test_deployer_reports_extraction_errors_without_running() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    let runner = Arc::new(FakeRunner::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let deployer = Deployer::new(test_env(&settings, runner.clone()), notifier.clone());

    deployer
        .handle(Err(ClassifyError::Extract(ExtractError::VersionNotFound(
            "hotfix".to_string(),
        ))))
        .await;

    assert!(runner.calls().is_empty());
    assert_eq!(
        notifier.messages(),
        vec!["Version not found in message: hotfix".to_string()]
    );
}

#[tokio::test]
async fn test_deployer_skips_silently() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    let runner = Arc::new(FakeRunner::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let deployer = Deployer::new(test_env(&settings, runner.clone()), notifier.clone());

    deployer
        .handle(Ok(Classification::Deploy(request("blog", "main", "prod"))))
        .await;
    deployer
        .handle(Ok(Classification::Ignore("branch \"feature\" has no stage".to_string())))
        .await;

    assert!(runner.calls().is_empty());
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_dispatched_runs_for_one_stage_do_not_overlap() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    provision(&settings, "shop", "prod", true);
    let runner = Arc::new(FakeRunner::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let deployer = Arc::new(Deployer::new(
        test_env(&settings, runner.clone()),
        notifier.clone(),
    ));

    for _ in 0..3 {
        deployer.dispatch(Ok(Classification::Deploy(request("shop", "main", "prod"))));
    }
    deployer.drain(std::time::Duration::from_secs(5)).await;

    assert_eq!(notifier.messages().len(), 3);
    assert_eq!(deployer.locks().len().await, 1);
    // Each run is a contiguous block starting with the pull
    let lines = runner.lines();
    let per_run = lines.len() / 3;
    for run in lines.chunks(per_run) {
        assert_eq!(run[0], "git checkout main");
        assert_eq!(run[1], "git pull");
        assert_eq!(run[per_run - 1], "docker image prune -f");
    }
}

#[tokio::test]
async fn test_archives_for_different_stages_share_one_lock() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    let runner = Arc::new(FakeRunner::new().on_run("git clone", |spec: &CommandSpec| {
        let checkout = std::path::PathBuf::from(spec.args.last().unwrap());
        std::fs::create_dir_all(checkout.join("archive")).unwrap();
        std::fs::write(checkout.join("archive").join("app.zip"), "zip").unwrap();
        std::fs::write(checkout.join("README.md"), "readme").unwrap();
    }));
    let notifier = Arc::new(RecordingNotifier::new());
    let deployer = Arc::new(Deployer::new(
        test_env(&settings, runner.clone()),
        notifier.clone(),
    ));

    deployer.dispatch(Ok(Classification::Archive(request("shop_client", "main", "prod"))));
    deployer.dispatch(Ok(Classification::Archive(request("shop_client", "dev", "dev"))));
    deployer.drain(std::time::Duration::from_secs(5)).await;

    assert_eq!(deployer.locks().len().await, 1);
    assert_eq!(notifier.messages().len(), 2);
    // Both stages copy into the same client directory, one run after the other
    let lines = runner.lines();
    assert_eq!(lines.len(), 4);
    for run in lines.chunks(2) {
        assert!(run[0].starts_with("git clone -- git@github.com:acme/shop_client.git"));
        assert!(run[1].starts_with("git checkout"));
    }
    let client_dir = settings.deploy.clients_dir.join("shop_client");
    assert!(client_dir.join("app.zip").is_file());
}

#[tokio::test]
async fn test_updates_of_one_checkout_share_one_lock() {
    let root = tempfile::tempdir().unwrap();
    let settings = test_settings(root.path());
    std::fs::create_dir_all(root.path().join("self")).unwrap();
    std::fs::create_dir_all(&settings.deploy.deploy_root).unwrap();
    let runner = Arc::new(FakeRunner::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let deployer = Arc::new(Deployer::new(
        test_env(&settings, runner.clone()),
        notifier.clone(),
    ));

    for name in ["deployhook", "deployhook-fork"] {
        deployer.dispatch(Ok(Classification::Update(UpdateRequest {
            repository_name: name.to_string(),
            branch: "main".to_string(),
        })));
    }
    deployer.drain(std::time::Duration::from_secs(5)).await;

    assert_eq!(deployer.locks().len().await, 1);
    assert_eq!(
        runner.lines(),
        vec!["git checkout main", "git pull", "git checkout main", "git pull"]
    );
}
