//! 应用部署配置
//!
//! 从 `deploy.config.json` 加载，进程生命周期内只读：
//!
//! ```json
//! {
//!   "apps": {
//!     "demo": {
//!       "repo": "https://github.com/example/demo.git",
//!       "branch": "main",
//!       "localPath": "demo",
//!       "filesToKeep": ["data/db.sqlite", ".env"],
//!       "appType": "node",
//!       "environment": "production"
//!     }
//!   }
//! }
//! ```

use anyhow::Context;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::run::{FailurePolicy, OnFailure};
use crate::error::{DeployError, DeployResult};

/// 单个应用的部署配置
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Git 仓库地址
    pub repo: String,
    /// 分支（不指定则使用默认分支）
    #[serde(default)]
    pub branch: Option<String>,
    /// 本地路径（相对于 base dir）
    pub local_path: PathBuf,
    /// 重新部署时保留的文件（相对于 local_path 的路径或 glob），可为单个字符串或数组
    #[serde(default, deserialize_with = "one_or_many")]
    pub files_to_keep: Vec<String>,
    /// 应用类型，目前仅支持 "node"
    #[serde(default = "default_app_type")]
    pub app_type: String,
    /// 环境标签（如 "production"），未设置时沿用进程的 NODE_ENV
    #[serde(default)]
    pub environment: Option<String>,
    /// install 失败时的处理方式，默认记录日志后继续
    #[serde(default = "default_install_failure")]
    pub install_failure: OnFailure,
}

fn default_app_type() -> String {
    "node".to_string()
}

fn default_install_failure() -> OnFailure {
    OnFailure::LogAndContinue
}

impl AppConfig {
    /// 是否配置了需要保留的文件
    pub fn keeps_files(&self) -> bool {
        !self.files_to_keep.is_empty()
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::with_install(self.install_failure)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<OneOrMany>::deserialize(deserializer)?;
    Ok(match value {
        None => Vec::new(),
        Some(OneOrMany::One(s)) if s.is_empty() => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

/// 全部应用的部署配置
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub apps: BTreeMap<String, AppConfig>,
}

impl DeployConfig {
    /// 从 JSON 文件加载
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deploy config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid deploy config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// 获取应用配置，未配置时返回配置错误
    pub fn get(&self, app: &str) -> DeployResult<&AppConfig> {
        self.apps
            .get(app)
            .ok_or_else(|| DeployError::UnknownApp(app.to_string()))
    }

    pub fn app_names(&self) -> Vec<String> {
        self.apps.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_app_config() {
        let config = DeployConfig::from_json(
            r#"{
                "apps": {
                    "demo": {
                        "repo": "https://example.com/demo.git",
                        "branch": "main",
                        "localPath": "demo",
                        "filesToKeep": ["data/db.sqlite", ".env"],
                        "appType": "node",
                        "environment": "production",
                        "installFailure": "abort"
                    }
                }
            }"#,
        )
        .unwrap();

        let app = config.get("demo").unwrap();
        assert_eq!(app.branch.as_deref(), Some("main"));
        assert_eq!(app.local_path, PathBuf::from("demo"));
        assert_eq!(app.files_to_keep, vec!["data/db.sqlite", ".env"]);
        assert_eq!(app.environment.as_deref(), Some("production"));
        assert_eq!(app.install_failure, OnFailure::Abort);
    }

    #[test]
    fn test_files_to_keep_accepts_single_string() {
        let config = DeployConfig::from_json(
            r#"{"apps": {"demo": {"repo": "r", "localPath": "demo", "filesToKeep": "uploads"}}}"#,
        )
        .unwrap();
        let app = config.get("demo").unwrap();
        assert_eq!(app.files_to_keep, vec!["uploads"]);
        assert!(app.keeps_files());
    }

    #[test]
    fn test_defaults() {
        let config =
            DeployConfig::from_json(r#"{"apps": {"demo": {"repo": "r", "localPath": "demo"}}}"#)
                .unwrap();
        let app = config.get("demo").unwrap();
        assert!(!app.keeps_files());
        assert!(app.branch.is_none());
        assert_eq!(app.app_type, "node");
        assert_eq!(app.install_failure, OnFailure::LogAndContinue);
        assert_eq!(app.failure_policy(), FailurePolicy::default());
    }

    #[test]
    fn test_unknown_app_is_configuration_error() {
        let config = DeployConfig::default();
        let err = config.get("missing").unwrap_err();
        assert!(matches!(err, DeployError::UnknownApp(ref name) if name == "missing"));
    }

    #[test]
    fn test_load_reports_path_on_failure() {
        let err = DeployConfig::load(Path::new("/nonexistent/deploy.config.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/deploy.config.json"));
    }

    #[test]
    fn test_example_config_parses() {
        let config =
            DeployConfig::from_json(include_str!("../../deploy.config.example.json")).unwrap();
        assert_eq!(config.app_names(), vec!["blog", "demo"]);
        assert_eq!(config.get("blog").unwrap().files_to_keep, vec!["uploads/"]);
    }
}
