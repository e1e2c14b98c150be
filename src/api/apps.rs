//! 应用部署 API
//!
//! 包含 /apps, /apps/:app/push-deploy, /apps/:app/install, /apps/:app/temp-dirs 端点

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::domain::deploy::DeployTask;
use crate::error::ApiResult;
use crate::middleware::{verify_signature, RequireApiKey};
use crate::services;
use crate::state::AppState;

/// 触发部署响应
#[derive(Debug, Serialize)]
pub struct PushDeployResponse {
    pub task_id: String,
    pub app: String,
    pub status: &'static str,
    pub task_url: String,
}

/// 安装依赖响应
#[derive(Debug, Serialize)]
pub struct InstallResponse {
    pub app: String,
    pub status: &'static str,
    pub exit_code: Option<i32>,
}

/// 清理临时目录响应
#[derive(Debug, Serialize)]
pub struct CleanTempDirsResponse {
    pub app: String,
    pub removed: usize,
}

/// 应用摘要
#[derive(Debug, Serialize)]
pub struct AppSummary {
    pub name: String,
    pub repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub local_path: String,
    pub files_to_keep: Vec<String>,
    pub busy: bool,
}

/// 创建应用路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/apps", get(list_apps))
        .route("/apps/:app/push-deploy", post(push_deploy))
        .route("/apps/:app/install", post(install_app))
        .route("/apps/:app/temp-dirs", delete(clean_temp_dirs))
}

/// GitHub push webhook
///
/// POST /apps/:app/push-deploy
/// 需要 `X-Hub-Signature`，签名校验通过后在后台部署，立即返回 202
async fn push_deploy(
    State(state): State<Arc<AppState>>,
    Path(app): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    state.deploy_config.get(&app)?;
    verify_signature(&headers, &body, &state.github_secret)?;

    let task_id = uuid::Uuid::new_v4().to_string();
    state
        .task_store
        .create(DeployTask::new(task_id.clone(), app.clone()))
        .await;

    tracing::info!(task_id = %task_id, app = %app, "Push received, deployment scheduled");

    let response = PushDeployResponse {
        task_id: task_id.clone(),
        app: app.clone(),
        status: "accepted",
        task_url: format!("/tasks/{}", task_id),
    };

    // 在后台执行部署（非阻塞）
    let state_clone = state.clone();
    tokio::spawn(async move {
        services::deploy::execute(state_clone, task_id, app).await;
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// 仅重新安装依赖
///
/// POST /apps/:app/install
async fn install_app(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(app): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.orchestrator.install_only(&app).await?;
    tracing::info!(app = %app, "Dependencies installed");

    Ok((
        StatusCode::ACCEPTED,
        Json(InstallResponse {
            app,
            status: "installed",
            exit_code: outcome.exit_code(),
        }),
    ))
}

/// 清理临时目录
///
/// DELETE /apps/:app/temp-dirs
async fn clean_temp_dirs(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(app): Path<String>,
) -> ApiResult<Json<CleanTempDirsResponse>> {
    let removed = state.orchestrator.clean_temp_dirs(&app).await?;
    tracing::info!(app = %app, removed, "Temp directories cleaned");
    Ok(Json(CleanTempDirsResponse { app, removed }))
}

/// 列出已配置的应用
///
/// GET /apps
async fn list_apps(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let busy = state.orchestrator.busy_apps().await;
    let apps: Vec<AppSummary> = state
        .deploy_config
        .apps
        .iter()
        .map(|(name, app)| AppSummary {
            name: name.clone(),
            repo: app.repo.clone(),
            branch: app.branch.clone(),
            local_path: app.local_path.display().to_string(),
            files_to_keep: app.files_to_keep.clone(),
            busy: busy.contains(name),
        })
        .collect();
    Json(serde_json::json!({ "apps": apps }))
}
