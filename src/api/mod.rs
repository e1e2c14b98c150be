//! API 模块
//!
//! HTTP handlers 和路由组装

pub mod apps;
pub mod health;
pub mod tasks;

use axum::{http::Uri, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

/// 构建完整的 API 路由
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health & Status
        .merge(health::router())
        // Apps
        .merge(apps::router())
        // Tasks
        .merge(tasks::router())
        .fallback(not_found)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("Route {}", uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeployConfig, EnvConfig};
    use crate::domain::deploy::DeployStatus;
    use crate::domain::install::{AppType, InstallOutcome};
    use crate::error::{DeployError, DeployResult};
    use crate::infra::RepositorySource;
    use crate::middleware::signature::{sign, SIGNATURE_HEADER};
    use crate::services::deploy::DependencyInstaller;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "webhook-secret";

    #[derive(Default)]
    struct FakeSource {
        clones: AtomicUsize,
    }

    #[async_trait]
    impl RepositorySource for FakeSource {
        async fn clone_repo(&self, _repo: &str, local_path: &Path, _branch: Option<&str>) -> DeployResult<()> {
            self.clones.fetch_add(1, Ordering::SeqCst);
            std::fs::create_dir_all(local_path)
                .map_err(|e| DeployError::fs("create directory", local_path, e))?;
            std::fs::write(local_path.join("package.json"), "{}")
                .map_err(|e| DeployError::fs("write", local_path, e))?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeInstaller {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DependencyInstaller for FakeInstaller {
        async fn install(&self, _local_path: &Path, app_type: &str, _env: Option<&str>) -> DeployResult<InstallOutcome> {
            AppType::parse(app_type)?;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(InstallOutcome::exited(Some(0), Vec::new(), Vec::new()))
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        source: Arc<FakeSource>,
        installer: Arc<FakeInstaller>,
        state: Arc<AppState>,
    }

    fn harness(api_key: Option<&str>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvConfig {
            port: 0,
            base_dir: dir.path().to_path_buf(),
            github_secret: Some(SECRET.to_string()),
            config_path: PathBuf::from("deploy.config.json"),
            node_env: None,
            api_key: api_key.map(str::to_string),
        };
        let deploy_config = DeployConfig::from_json(
            r#"{"apps": {"demo": {"repo": "https://example.com/demo.git", "localPath": "demo", "filesToKeep": ["data/db.sqlite"]}}}"#,
        )
        .unwrap();
        let source = Arc::new(FakeSource::default());
        let installer = Arc::new(FakeInstaller::default());
        let state = AppState::with_backends(env, deploy_config, source.clone(), installer.clone()).unwrap();
        Harness {
            dir,
            source,
            installer,
            state: Arc::new(state),
        }
    }

    fn push_request(app: &str, body: &'static str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/apps/{}/push-deploy", app))
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_push_deploy_with_valid_signature_runs_in_background() {
        let h = harness(None);
        let body = r#"{"ref":"refs/heads/main"}"#;
        let signature = sign(SECRET.as_bytes(), body.as_bytes()).unwrap();

        let response = router(h.state.clone())
            .oneshot(push_request("demo", body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = json_body(response).await;
        let task_id = json["task_id"].as_str().unwrap().to_string();

        let mut finished = None;
        for _ in 0..100 {
            if let Some(task) = h.state.task_store.get_any(&task_id).await {
                if task.status.is_terminal() {
                    finished = Some(task);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let task = finished.expect("deploy task did not finish");
        assert_eq!(task.status, DeployStatus::Success);
        assert_eq!(h.source.clones.load(Ordering::SeqCst), 1);
        assert!(h.dir.path().join("demo/package.json").exists());
    }

    #[tokio::test]
    async fn test_push_deploy_rejects_bad_or_missing_signature_before_any_work() {
        let h = harness(None);
        let body = r#"{"ref":"refs/heads/main"}"#;

        let response = router(h.state.clone())
            .oneshot(push_request("demo", body, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let forged = sign(b"not-the-secret", body.as_bytes()).unwrap();
        let response = router(h.state.clone())
            .oneshot(push_request("demo", body, Some(forged)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"], "bad_request");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.source.clones.load(Ordering::SeqCst), 0);
        assert!(!h.dir.path().join("demo").exists());
        assert_eq!(h.state.task_store.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_push_deploy_for_unknown_app_is_not_found() {
        let h = harness(None);
        let body = r#"{"ref":"refs/heads/main"}"#;
        let signature = sign(SECRET.as_bytes(), body.as_bytes()).unwrap();

        let response = router(h.state.clone())
            .oneshot(push_request("ghost", body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_install_requires_populated_directory() {
        let h = harness(None);
        let request = || {
            Request::builder()
                .method("POST")
                .uri("/apps/demo/install")
                .body(Body::empty())
                .unwrap()
        };

        let response = router(h.state.clone()).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.installer.calls.load(Ordering::SeqCst), 0);

        std::fs::create_dir_all(h.dir.path().join("demo")).unwrap();
        std::fs::write(h.dir.path().join("demo/package.json"), "{}").unwrap();
        let response = router(h.state.clone()).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(h.installer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delete_temp_dirs_reports_removed_count() {
        let h = harness(None);
        std::fs::create_dir_all(h.dir.path().join("demo_temp_1700000000000_abcd1234")).unwrap();

        let request = || {
            Request::builder()
                .method("DELETE")
                .uri("/apps/demo/temp-dirs")
                .body(Body::empty())
                .unwrap()
        };

        let response = router(h.state.clone()).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["removed"], 1);

        let response = router(h.state.clone()).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["removed"], 0);
    }

    #[tokio::test]
    async fn test_operator_routes_require_api_key_when_configured() {
        let h = harness(Some("ops-key"));

        let response = router(h.state.clone())
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/apps/demo/temp-dirs")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router(h.state.clone())
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/apps/demo/temp-dirs")
                    .header("x-api-key", "ops-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unmatched_route_returns_json_not_found() {
        let h = harness(None);
        let response = router(h.state.clone())
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn test_health_lists_apps() {
        let h = harness(None);
        let response = router(h.state.clone())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["apps"][0], "demo");
    }
}
