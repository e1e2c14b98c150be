//! Hook Deploy Agent
//!
//! Usage:
//! - Serve webhooks: `hook-deploy-agent` or `hook-deploy-agent serve --port 3000`
//! - One-shot redeploy: `hook-deploy-agent deploy <app>`
//! - Reinstall dependencies: `hook-deploy-agent install <app>`
//! - Remove leftover temp dirs: `hook-deploy-agent clean <app>`
//! - List configured apps: `hook-deploy-agent apps`

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use hook_deploy_agent::config::DeployConfig;
use hook_deploy_agent::infra::GitCli;
use hook_deploy_agent::services::deploy::{Orchestrator, ProcessInstaller};
use hook_deploy_agent::RuntimeConfig;

#[derive(Parser)]
#[command(name = "hook-deploy-agent", version, about = "Webhook-driven app redeploy agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook HTTP server (default)
    Serve {
        /// Override the listening port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Redeploy an app now: clone, install, restore kept files
    Deploy { app: String },
    /// Reinstall dependencies in an app's existing directory
    Install { app: String },
    /// Remove an app's leftover temp directories
    Clean { app: String },
    /// List configured apps
    Apps,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    hook_deploy_agent::init_tracing();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            hook_deploy_agent::init_and_run_agent_with_config(RuntimeConfig { port_override: port })
                .await
        }
        Command::Deploy { app } => {
            let orchestrator = build_orchestrator()?;
            let report = orchestrator.deploy(&app).await?;
            for stage in &report.stages {
                println!(
                    "{:<22} {:<8} {}",
                    stage.display_name,
                    format!("{:?}", stage.status).to_lowercase(),
                    stage.message.as_deref().unwrap_or("")
                );
            }
            println!("Deployed {} to {}", report.app, report.local_path.display());
            Ok(())
        }
        Command::Install { app } => {
            let orchestrator = build_orchestrator()?;
            let outcome = orchestrator.install_only(&app).await?;
            print!("{}", outcome.stdout_lossy());
            println!("Installed dependencies for {} ({})", app, outcome);
            Ok(())
        }
        Command::Clean { app } => {
            let orchestrator = build_orchestrator()?;
            let removed = orchestrator.clean_temp_dirs(&app).await?;
            println!("Removed {} temp directories for {}", removed, app);
            Ok(())
        }
        Command::Apps => {
            let (_, deploy_config) = hook_deploy_agent::load_config()?;
            for (name, app) in &deploy_config.apps {
                println!("{:<20} {} -> {}", name, app.repo, app.local_path.display());
            }
            Ok(())
        }
    }
}

/// 一次性命令不需要 webhook 密钥
fn build_orchestrator() -> Result<Orchestrator> {
    let (env, deploy_config): (_, DeployConfig) = hook_deploy_agent::load_config()?;
    Ok(Orchestrator::new(
        Arc::new(deploy_config),
        env.base_dir,
        Arc::new(GitCli::default()),
        Arc::new(ProcessInstaller::new(env.node_env)),
    ))
}
