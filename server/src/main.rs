mod config;
mod forward;
mod http;

use std::{
    fmt::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use platform_authz::{
    Decision, Gatekeeper, PolicyConfig, PolicyStore, RequestDescriptor, RoleHierarchy,
};
use platform_obs::{ObsConfig, init_tracing};

use crate::{
    config::AppConfig,
    http::{AppState, ServeConfig},
};

#[derive(Parser, Debug)]
#[command(name = "data-gateway", version, about = "Role-based authorization gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP gateway.
    Serve(ServeCommand),
    /// Strictly parse a policy file and print its roles and rules.
    #[command(name = "policy:check")]
    PolicyCheck {
        #[arg(
            long,
            value_name = "FILE",
            help = "Policy file (defaults to ROLES_CONFIG_PATH)"
        )]
        file: Option<PathBuf>,
    },
    /// Show how one request would be authorized.
    #[command(name = "policy:explain")]
    PolicyExplain(ExplainCommand),
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

impl From<ServeCommand> for ServeConfig {
    fn from(value: ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[derive(Args, Debug)]
struct ExplainCommand {
    #[arg(long)]
    path: String,
    #[arg(long, default_value = "GET")]
    method: String,
    #[arg(long, help = "Bearer token to present")]
    token: Option<String>,
    #[arg(long, value_name = "FILE")]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let obs = match cli.command {
        Command::Serve(_) => ObsConfig::from_env(),
        _ => ObsConfig::for_cli(),
    };
    init_tracing(obs)?;
    let app_config = Arc::new(AppConfig::load()?);
    match cli.command {
        Command::Serve(cmd) => run_server(cmd, app_config).await,
        Command::PolicyCheck { file } => {
            policy_check(file.unwrap_or_else(|| app_config.policy_path.clone()))
        }
        Command::PolicyExplain(cmd) => policy_explain(cmd, &app_config),
    }
}

async fn run_server(cmd: ServeCommand, config: Arc<AppConfig>) -> Result<()> {
    let state = AppState::from_config(config)?;
    http::serve(cmd.into(), state).await
}

fn policy_check(path: PathBuf) -> Result<()> {
    print!("{}", check_report(&path)?);
    Ok(())
}

fn policy_explain(cmd: ExplainCommand, config: &AppConfig) -> Result<()> {
    print!("{}", explain_report(cmd, config)?);
    Ok(())
}

/// Strictly parse `path` and describe its roles and rules.
fn check_report(path: &Path) -> Result<String> {
    let policy = PolicyConfig::from_path(path)
        .with_context(|| format!("policy {} is invalid", path.display()))?;
    let mut out = String::new();
    writeln!(out, "policy: {}", path.display())?;
    writeln!(out, "default role: {}", policy.default_role())?;
    writeln!(out, "admin role:   {}", policy.admin_role())?;
    write_hierarchy(&mut out, policy.hierarchy())?;
    writeln!(out, "rules ({}):", policy.rule_count())?;
    for rule in policy.rules() {
        writeln!(
            out,
            "  {:<7} {:<40} {:<12} {}.{}",
            rule.method, rule.path, rule.required_role, rule.category, rule.name
        )?;
    }
    Ok(out)
}

fn write_hierarchy(out: &mut String, hierarchy: &RoleHierarchy) -> fmt::Result {
    writeln!(out, "roles:")?;
    for (role, level) in hierarchy.ordered() {
        writeln!(out, "  {:>4}  {}", level, role)?;
    }
    Ok(())
}

fn explain_decision(cmd: ExplainCommand, config: &AppConfig) -> Decision {
    let path = cmd.file.unwrap_or_else(|| config.policy_path.clone());
    let store = Arc::new(PolicyStore::from_path(path));
    let gate = Gatekeeper::with_static_secret(store, config.api_key.clone());

    let mut request = RequestDescriptor::new(cmd.path, cmd.method);
    if let Some(token) = cmd.token.as_deref() {
        request = request.with_bearer(token);
    }
    let role = gate.resolve_role(&request);
    gate.enforcer().decide(&role, &request.path, &request.method)
}

fn explain_report(cmd: ExplainCommand, config: &AppConfig) -> Result<String> {
    let decision = explain_decision(cmd, config);
    let mut out = String::new();
    writeln!(out, "resolved role: {}", decision.role)?;
    writeln!(out, "required role: {}", decision.required)?;
    writeln!(
        out,
        "decision:      {}",
        if decision.allowed { "allow" } else { "deny (403)" }
    )?;
    Ok(out)
}
