//! CLI commands

use crate::config;
use anyhow::{Context as _, Result, bail};
use clap::Subcommand;
use shiftclock_core::Settings;
use shiftclock_session::{
    AuthCoordinator, AuthStatus, Credentials, HttpAuthApi, InMemoryAuthApi, Language, SessionEvent,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Everything a command needs besides its own arguments
pub struct Context {
    pub settings: Settings,
    pub offline: bool,
    pub language: Language,
}

impl Context {
    fn coordinator(&self) -> Result<AuthCoordinator> {
        let builder = if self.offline {
            // Its refresh tokens die with the process, so nothing is persisted.
            info!("offline mode, session is kept in memory");
            AuthCoordinator::builder(Arc::new(InMemoryAuthApi::new()))
        } else {
            let api = HttpAuthApi::from_config(&self.settings.api).context("invalid API client")?;
            let store = config::session_store(&self.settings)?;
            info!(path = %store.path().display(), "using session file");
            AuthCoordinator::builder(Arc::new(api)).store(Arc::new(store))
        };
        builder
            .config(self.settings.session.clone())
            .language(self.language)
            .build()
            .context("invalid session settings")
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "SHIFTCLOCK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// End the stored session and revoke its refresh token
    Logout,

    /// Show whether a session is stored and when its token expires
    Status,

    /// Print the signed-in user and their role
    Whoami,

    /// Keep the session alive; each line on stdin counts as activity
    Watch {
        /// Sign in first instead of resuming the stored session
        #[arg(long, requires = "password")]
        email: Option<String>,

        #[arg(long, env = "SHIFTCLOCK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

impl Commands {
    pub async fn execute(self, context: Context) -> Result<()> {
        let coordinator = context.coordinator()?;
        match self {
            Self::Login { email, password } => login(&coordinator, email, password).await,
            Self::Logout => {
                coordinator.logout().await;
                println!("Signed out");
                Ok(())
            }
            Self::Status => {
                status(&coordinator);
                Ok(())
            }
            Self::Whoami => whoami(&coordinator),
            Self::Watch { email, password } => {
                if let (Some(email), Some(password)) = (email, password) {
                    login(&coordinator, email, password).await?;
                }
                watch(&coordinator).await
            }
        }
    }
}

async fn login(coordinator: &AuthCoordinator, email: String, password: String) -> Result<()> {
    match coordinator.login(&Credentials::new(email, password)).await {
        Ok(session) => {
            println!("Signed in as {} ({})", session.display_name, session.role);
            Ok(())
        }
        Err(e) => bail!(coordinator.last_error().unwrap_or_else(|| e.to_string())),
    }
}

fn status(coordinator: &AuthCoordinator) {
    let state = coordinator.state();
    match (state.status, state.session) {
        (AuthStatus::Authenticated, Some(session)) => {
            let remaining = coordinator.tokens().time_until_expiration();
            println!("Signed in as {}", session.email);
            println!("Access token expires in {}s", remaining.as_secs());
            if coordinator.tokens().needs_refresh() {
                println!("Token refresh is due");
            }
        }
        _ => println!("Not signed in"),
    }
}

fn whoami(coordinator: &AuthCoordinator) -> Result<()> {
    let Some(session) = coordinator.current_user() else {
        bail!("Not signed in");
    };
    println!("{} <{}>", session.display_name, session.email);
    println!("user id:  {}", session.user_id);
    println!("role:     {}", session.role);
    if let Some(company) = &session.company_id {
        println!("company:  {company}");
    }
    if let Some(permissions) = coordinator.permissions() {
        let names: Vec<String> = permissions
            .capabilities()
            .iter()
            .map(|capability| format!("{capability:?}"))
            .collect();
        println!("can:      {}", names.join(", "));
    }
    Ok(())
}

async fn watch(coordinator: &AuthCoordinator) -> Result<()> {
    if !coordinator.is_authenticated() {
        bail!("Not signed in");
    }
    let mut events = coordinator.events();
    let mut state = coordinator.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Watching session; press Enter to record activity, Ctrl-C to detach");

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(_)) => {
                    coordinator.record_activity();
                    coordinator.check_and_refresh_now();
                }
                Ok(None) => return Ok(()),
                Err(e) => return Err(e).context("failed to read stdin"),
            },
            event = events.recv() => match event {
                Ok(SessionEvent::Warning { reason, remaining }) => {
                    println!("Session ends in {}s ({reason} timeout)", remaining.as_secs());
                }
                Ok(SessionEvent::TimedOut { reason }) => {
                    println!("Session timed out ({reason})");
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed session events"),
                Err(RecvError::Closed) => return Ok(()),
            },
            changed = state.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let snapshot = state.borrow_and_update().clone();
                if snapshot.status == AuthStatus::Anonymous {
                    if let Some(message) = snapshot.error {
                        println!("{message}");
                    }
                    println!("Signed out");
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Detached; session is still stored");
                return Ok(());
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiftclock_core::StorageConfig;

    fn context(dir: &std::path::Path, offline: bool) -> Context {
        let settings = Settings {
            storage: StorageConfig {
                data_dir: Some(dir.to_path_buf()),
                ..StorageConfig::default()
            },
            ..Settings::default()
        };
        Context {
            settings,
            offline,
            language: Language::English,
        }
    }

    #[tokio::test]
    async fn test_offline_session_is_not_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = context(dir.path(), true).coordinator().unwrap();
        login(&coordinator, "employee@acme.io".into(), "secret".into())
            .await
            .unwrap();

        assert!(coordinator.is_authenticated());
        assert!(coordinator.tokens().get_tokens().is_some());
        assert!(!dir.path().join("session.json").exists());

        let resumed = context(dir.path(), true).coordinator().unwrap();
        assert!(!resumed.is_authenticated());
    }

    #[tokio::test]
    async fn test_online_context_uses_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = context(dir.path(), false).coordinator().unwrap();
        assert!(!coordinator.is_authenticated());
        assert!(whoami(&coordinator).is_err());
    }
}
