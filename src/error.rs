//! 统一错误处理
//!
//! - `DeployError`: 部署流程（路径解析、保留文件、clone、install）的领域错误
//! - `ApiError`: 实现 `IntoResponse`，供 HTTP handlers 使用

use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// 开发模式下错误响应附带完整错误链
static VERBOSE_ERRORS: OnceLock<bool> = OnceLock::new();

/// 设置错误响应是否包含详细信息（仅首次调用生效）
pub fn set_verbose_errors(verbose: bool) {
    let _ = VERBOSE_ERRORS.set(verbose);
}

fn verbose_errors() -> bool {
    VERBOSE_ERRORS.get().copied().unwrap_or(false)
}

/// 部署流程错误
#[derive(Debug, Error)]
pub enum DeployError {
    /// 未配置的应用
    #[error("No deployment configuration for app \"{0}\"")]
    UnknownApp(String),

    /// 配置错误（如不支持的应用类型）
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 文件系统操作失败
    #[error("Failed to {op} {}: {source}", .path.display())]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// git clone 失败
    #[error("Failed to clone {repo} into {}: {message}", .path.display())]
    Clone {
        repo: String,
        path: PathBuf,
        message: String,
    },

    /// 依赖安装失败（仅在 install-only 或 abort 策略下向调用方传播）
    #[error("Install failed: {0}")]
    Install(String),

    /// 前置条件不满足
    #[error("{0}")]
    Precondition(String),

    /// 恢复保留文件失败，文件系统处于部分恢复状态
    #[error("Failed to restore {} to {}: {source}", .from.display(), .to.display())]
    Restore {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DeployError {
    pub fn fs(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            op,
            path: path.into(),
            source,
        }
    }

    /// 未知应用或不支持的应用类型
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::UnknownApp(_) | Self::Configuration(_))
    }

    /// 不含路径和命令输出的简短描述
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::UnknownApp(_) => "Unknown app",
            Self::Configuration(_) => "Invalid deployment configuration",
            Self::Filesystem { .. } => "Filesystem operation failed",
            Self::Clone { .. } => "Failed to clone repository",
            Self::Install(_) => "Dependency installation failed",
            Self::Precondition(_) => "Precondition failed",
            Self::Restore { .. } => "Failed to restore kept files",
        }
    }
}

pub type DeployResult<T> = Result<T, DeployError>;

/// API 错误响应结构
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// 统一 API 错误类型
#[derive(Debug)]
pub enum ApiError {
    /// 401 - 未授权（API Key 无效或缺失）
    Unauthorized,
    /// 404 - 资源未找到
    NotFound(String),
    /// 400 - 请求无效（包括 webhook 签名错误）
    BadRequest(String),
    /// 500 - 内部错误
    Internal(String),
    /// 部署流程错误，按类型映射状态码
    Deploy(DeployError),
}

impl ApiError {
    /// 创建未授权错误
    pub fn unauthorized() -> Self {
        Self::Unauthorized
    }

    /// 创建未找到错误
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// 创建请求无效错误
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        Self::Deploy(err)
    }
}

/// 拼接错误链，用于开发模式下的 details 字段
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = format!("{:?}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str("\ncaused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut details = None;
        let (status, error_type, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid or missing API key".to_string(),
            ),
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{} not found", resource),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::Deploy(err) => {
                let verbose = verbose_errors();
                if verbose {
                    details = Some(error_chain(&err));
                }
                let (status, error_type) = match &err {
                    DeployError::UnknownApp(_) => (StatusCode::NOT_FOUND, "not_found"),
                    DeployError::Precondition(_) => (StatusCode::BAD_REQUEST, "precondition_failed"),
                    DeployError::Configuration(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
                    }
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "deploy_error"),
                };
                // 生产模式下 5xx 不暴露路径等内部细节
                let message = if status.is_server_error() && !verbose {
                    tracing::error!(error = %err, "Deploy operation failed");
                    err.public_message().to_string()
                } else {
                    err.to_string()
                };
                (status, error_type, message)
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "Request failed");
        }

        let mut body = ErrorResponse::new(error_type, message);
        if let Some(details) = details {
            body = body.with_details(details);
        }
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::NotFound(r) => write!(f, "Not found: {}", r),
            ApiError::BadRequest(m) => write!(f, "Bad request: {}", m),
            ApiError::Internal(m) => write!(f, "Internal error: {}", m),
            ApiError::Deploy(e) => write!(f, "Deploy error: {}", e),
        }
    }
}

impl std::error::Error for ApiError {}

/// 便捷类型别名
pub type ApiResult<T> = Result<T, ApiError>;
