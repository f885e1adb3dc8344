//! Setup validation checks against scripted gcloud output

mod common;

use common::{cli, ScriptedRunner};
use gcp_assess::validate::{
    check_authentication, check_compute_api, check_monitoring_api, check_organization_access,
    check_project_access, ValidationInputs,
};
use std::sync::Arc;

const ORGS: &str = r#"[{"name": "organizations/123", "organizationId": "123"}]"#;

fn inputs() -> ValidationInputs {
    ValidationInputs::default()
}

#[tokio::test]
async fn service_account_is_recognized() {
    let runner = Arc::new(ScriptedRunner::new().ok(
        "gcloud auth list --format=json",
        r#"[{"account": "scanner@p1.iam.gserviceaccount.com", "status": "ACTIVE"}]"#,
    ));

    let result = check_authentication(&cli(&runner)).await;
    assert!(result.success);
    assert_eq!(result.message, "Authentication configured (Service Account)");
}

#[tokio::test]
async fn unknown_target_organization_fails() {
    let runner = Arc::new(ScriptedRunner::new().ok("gcloud organizations list --format=json", ORGS));
    let inputs = ValidationInputs {
        organization_id: Some("999".to_string()),
        ..inputs()
    };

    let result = check_organization_access(&cli(&runner), &inputs).await;
    assert!(!result.success);
    assert_eq!(result.message, "Target organization 999 not accessible");
    assert!(result.details.iter().any(|d| d == "- organizations/123 (ID: 123)"));
}

#[tokio::test]
async fn organization_filter_wins_over_folder_for_listing() {
    let runner = Arc::new(ScriptedRunner::new().ok(
        "gcloud projects list --format=json --filter=parent.id=123",
        r#"[{"projectId": "a", "name": "A", "lifecycleState": "ACTIVE"},
            {"projectId": "b", "name": "B", "lifecycleState": "ACTIVE"},
            {"projectId": "c", "name": "C", "lifecycleState": "ACTIVE"},
            {"projectId": "d", "name": "D", "lifecycleState": "ACTIVE"},
            {"projectId": "e", "name": "E", "lifecycleState": "ACTIVE"},
            {"projectId": "f", "name": "F", "lifecycleState": "ACTIVE"}]"#,
    ));
    let inputs = ValidationInputs {
        organization_id: Some("123".to_string()),
        folder_id: Some("456".to_string()),
        ..inputs()
    };

    let result = check_project_access(&cli(&runner), &inputs).await;
    assert!(result.success);
    assert_eq!(result.message, "Access to 6 active project(s) in organization 123");
    assert_eq!(result.details.len(), 6);
    assert_eq!(result.details[5], "... and 1 more projects");
}

#[tokio::test]
async fn explicit_projects_are_described() {
    let runner = Arc::new(ScriptedRunner::new().ok(
        "gcloud projects describe a --format=json",
        r#"{"projectId": "a", "name": "A", "lifecycleState": "ACTIVE"}"#,
    ));
    let inputs = ValidationInputs {
        project_ids: vec!["a".to_string(), "b".to_string()],
        ..inputs()
    };

    let result = check_project_access(&cli(&runner), &inputs).await;
    assert!(result.success);
    assert_eq!(result.message, "Access to 1/2 specified projects");
}

#[tokio::test]
async fn disabled_api_is_diagnosed() {
    let runner = Arc::new(
        ScriptedRunner::new()
            .ok(
                "gcloud projects list --limit=1 --format=json",
                r#"[{"projectId": "p1"}]"#,
            )
            .fail(
                "gcloud compute instances list --project=p1 --format=json --limit=1",
                "ERROR: Compute Engine API has not been used in project 100 before or it is disabled.",
            )
            .fail(
                "gcloud monitoring metrics list --project=p1 --limit=1 --format=json",
                "ERROR: (gcloud.monitoring.metrics.list) Permission denied",
            ),
    );
    let cli = cli(&runner);

    let compute = check_compute_api(&cli).await;
    assert!(!compute.success);
    assert_eq!(compute.message, "Compute Engine API not enabled");

    let monitoring = check_monitoring_api(&cli).await;
    assert!(!monitoring.success);
    assert_eq!(monitoring.message, "Insufficient monitoring permissions");
}

#[tokio::test]
async fn no_sample_project_fails_api_checks() {
    let runner = Arc::new(ScriptedRunner::new().ok("gcloud projects list --limit=1 --format=json", "[]"));

    let result = check_compute_api(&cli(&runner)).await;
    assert!(!result.success);
    assert_eq!(result.message, "No projects available for API validation");
}
