//! Command handlers for the `postsmgr` binary.
//!
//! `App` owns the configuration and the gateway client and plays the role
//! of the view layer: it turns client results into terminal output and
//! reacts to `ClientEvent::LoginRequired` by sending the user to `login`.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use postsmgr_core::api::{ApiError, ApiErrorKind, ClientEvent};
use postsmgr_core::models::{Credentials, ImageUpload, NewPost, Post, PostUpdate, Registration};
use postsmgr_core::{ApiClient, Config};

use crate::format::{format_date, format_optional, post_row, posts_count};

/// Width of the description column in `list` output
const DESCRIPTION_WIDTH: usize = 50;

pub struct App {
    config: Config,
    api: ApiClient,
    events: broadcast::Receiver<ClientEvent>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let session = Arc::new(config.open_session_store()?);
        let api = ApiClient::new(&config, session)?;
        let events = api.subscribe_events();
        debug!(base_url = %api.base_url(), "Client ready");
        Ok(Self {
            config,
            api,
            events,
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn login(&mut self, email: Option<String>) -> Result<()> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt_line("Email: ")?,
        };
        let password = rpassword::prompt_password("Password: ")?;
        if email.is_empty() || password.is_empty() {
            return Err(anyhow::anyhow!("Email and password required"));
        }

        let credentials = Credentials {
            email: email.clone(),
            password,
        };
        let user = self.api.login(&credentials).await.map_err(|e| user_error(&e))?;

        self.remember_email(email);
        info!(user_id = user.id, "Login successful");
        println!("Signed in as {}", user.display());
        Ok(())
    }

    pub async fn register(&mut self, name: String, email: String) -> Result<()> {
        let password = rpassword::prompt_password("Password: ")?;
        let confirmation = rpassword::prompt_password("Confirm password: ")?;
        if password != confirmation {
            return Err(anyhow::anyhow!("Passwords do not match"));
        }

        let registration = Registration::new(name, email.clone(), password);
        let user = self
            .api
            .register(&registration)
            .await
            .map_err(|e| user_error(&e))?;

        self.remember_email(email);
        println!("Account created. Signed in as {}", user.display());
        Ok(())
    }

    pub async fn logout(&mut self) -> Result<()> {
        match self.api.logout().await {
            Ok(()) => println!("Signed out"),
            // The local session is gone either way
            Err(e) => println!("Signed out locally ({})", e),
        }
        Ok(())
    }

    pub async fn whoami(&mut self) -> Result<()> {
        if !self.api.session().is_authenticated() {
            println!("Not signed in");
            return Ok(());
        }
        let user = self.api.current_user().await.map_err(|e| user_error(&e))?;
        println!("{}", user.display());
        Ok(())
    }

    /// Local session state; makes no network call.
    pub fn status(&self) {
        println!("API:     {}", self.api.base_url());
        println!("Storage: {:?}", self.config.session_backend);
        match self.api.session().snapshot() {
            Some(data) => {
                let who = data
                    .user
                    .as_ref()
                    .map(|u| u.display())
                    .unwrap_or_else(|| "unknown user".to_string());
                println!(
                    "Session: signed in as {} ({} min)",
                    who,
                    data.age_minutes()
                );
            }
            None => println!("Session: not signed in"),
        }
    }

    // =========================================================================
    // Posts
    // =========================================================================

    pub async fn list(&mut self, json: bool) -> Result<()> {
        let posts = self.api.list_posts().await.map_err(|e| user_error(&e))?;
        if json {
            println!("{}", serde_json::to_string_pretty(&posts)?);
            return Ok(());
        }
        println!("{}", posts_count(posts.len()));
        for post in &posts {
            println!("{}", post_row(post, DESCRIPTION_WIDTH));
        }
        Ok(())
    }

    pub async fn show(&mut self, id: i64, json: bool) -> Result<()> {
        let post = self.api.get_post(id).await.map_err(|e| user_error(&e))?;
        if json {
            println!("{}", serde_json::to_string_pretty(&post)?);
        } else {
            self.print_post(&post);
        }
        Ok(())
    }

    pub async fn create(
        &mut self,
        title: String,
        description: String,
        image: Option<PathBuf>,
    ) -> Result<()> {
        let mut post = NewPost::new(title, description);
        if let Some(path) = image {
            post = post.with_image(ImageUpload::from_path(&path)?);
        }
        let created = self.api.create_post(post).await.map_err(|e| user_error(&e))?;
        println!("Created post {}", created.id);
        self.print_post(&created);
        Ok(())
    }

    pub async fn update(
        &mut self,
        id: i64,
        title: Option<String>,
        description: Option<String>,
        image: Option<PathBuf>,
    ) -> Result<()> {
        let update = PostUpdate {
            title,
            description,
            image: image.map(|p| ImageUpload::from_path(&p)).transpose()?,
        };
        if update.is_empty() {
            return Err(anyhow::anyhow!("Nothing to update: pass --title, --description or --image"));
        }
        let updated = self
            .api
            .update_post(id, update)
            .await
            .map_err(|e| user_error(&e))?;
        println!("Updated post {}", updated.id);
        self.print_post(&updated);
        Ok(())
    }

    /// Delete several posts at once. Calls run concurrently; failures are reported per id.
    /// Asks first unless `yes` is set.
    pub async fn delete(&mut self, ids: Vec<i64>, yes: bool) -> Result<()> {
        if !yes {
            let answer = prompt_line(&delete_prompt(ids.len()))?;
            if !is_confirmed(&answer) {
                println!("Nothing deleted");
                return Ok(());
            }
        }

        let calls = ids.iter().map(|&id| {
            let api = self.api.clone();
            async move { (id, api.delete_post(id).await) }
        });
        let results = futures::future::join_all(calls).await;

        let mut failed = 0;
        for (id, result) in results {
            match result {
                Ok(_) => println!("Deleted post {}", id),
                Err(e) => {
                    failed += 1;
                    warn!(id, error = %e, "Delete failed");
                    eprintln!("Post {}: {}", id, describe_error(&e));
                }
            }
        }
        if failed > 0 {
            return Err(anyhow::anyhow!("{} of {} deletions failed", failed, ids.len()));
        }
        Ok(())
    }

    fn print_post(&self, post: &Post) {
        println!("#{} {}", post.id, post.title);
        if !post.description.is_empty() {
            println!("{}", post.description);
        }
        if let Some(ref image) = post.image {
            match self.api.image_url(image) {
                Ok(url) => println!("Image:   {}", url),
                Err(e) => warn!(error = %e, "Could not build image URL"),
            }
        }
        let created = post.created_at.as_deref().map(format_date);
        println!("Created: {}", format_optional(&created, "-"));
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Drain client events after a command. Returns true when the user must sign in again.
    pub fn handle_events(&mut self) -> bool {
        let mut login_required = false;
        loop {
            match self.events.try_recv() {
                Ok(ClientEvent::LoginRequired { redirect_to }) => {
                    debug!(%redirect_to, "Login required");
                    login_required = true;
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "Missed client events");
                }
                Err(_) => break,
            }
        }
        if login_required {
            eprintln!("Session expired. Run `postsmgr login` to sign in again.");
        }
        login_required
    }

    fn remember_email(&mut self, email: String) {
        self.config.last_email = Some(email);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read from stdin")?;
    Ok(input.trim().to_string())
}

fn delete_prompt(count: usize) -> String {
    match count {
        1 => "Are you sure you want to delete this post? [y/N] ".to_string(),
        n => format!("Are you sure you want to delete these {} posts? [y/N] ", n),
    }
}

/// Only an explicit yes confirms.
fn is_confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Message shown to the user for a failed call
pub fn describe_error(error: &ApiError) -> String {
    match error.kind() {
        ApiErrorKind::Auth => format!("Not authorized: {}", error.message()),
        ApiErrorKind::Network => {
            "Unable to reach the server. Check that it is running and try again.".to_string()
        }
        ApiErrorKind::Server => {
            let mut message = error.message().to_string();
            if let Some(fields) = error.validation_errors().and_then(|v| v.as_object()) {
                for (field, problems) in fields {
                    let text = match problems {
                        serde_json::Value::Array(items) => items
                            .iter()
                            .filter_map(|i| i.as_str())
                            .collect::<Vec<_>>()
                            .join(" "),
                        other => other.to_string(),
                    };
                    message.push_str(&format!("\n  {}: {}", field, text));
                }
            }
            message
        }
        ApiErrorKind::Request => error.to_string(),
    }
}

fn user_error(error: &ApiError) -> anyhow::Error {
    anyhow::anyhow!(describe_error(error))
}
