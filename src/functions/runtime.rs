//! Event dispatch. One runtime owns the gateway event stream and fans each
//! inbound event out to intake, routing, resolution or the staff commands.
//! Per-event failures are logged and never take the loop down.

use crate::config::Config;
use crate::functions::commands;
use crate::functions::intake::{IntakeEvent, IntakeInput, SessionStore};
use crate::functions::quota::{self, Admission};
use crate::functions::resolve::{self, InboundReply, NotificationStatus, ResolveOutcome};
use crate::functions::routing::{self, RouteError};
use crate::schema::Category;
use crate::services::exporter::ReportExporter;
use crate::services::gateway::{
    GatewayEvent, MessagingGateway, deliver_with_timeout, notify_with_timeout,
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::watch;

pub struct Runtime {
    db: SqlitePool,
    gateway: Arc<dyn MessagingGateway>,
    config: Arc<Config>,
    sessions: SessionStore,
    exporter: Arc<dyn ReportExporter>,
}

impl Runtime {
    pub fn new(
        db: SqlitePool,
        gateway: Arc<dyn MessagingGateway>,
        config: Arc<Config>,
        exporter: Arc<dyn ReportExporter>,
    ) -> Self {
        Self {
            db,
            gateway,
            config,
            sessions: SessionStore::new(),
            exporter,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                event = self.gateway.next_event() => {
                    let Some(event) = event else {
                        tracing::warn!("runtime: gateway event stream closed");
                        break;
                    };
                    if let Err(e) = self.handle_event(event).await {
                        tracing::error!(error = %e, "runtime: event handling failed");
                    }
                }
            }
        }
        Ok(())
    }

    pub async fn handle_event(&self, event: GatewayEvent) -> anyhow::Result<()> {
        match event {
            GatewayEvent::UserMessage {
                user_id,
                display_name,
                text,
                photo,
            } => {
                self.on_user_message(user_id, &display_name, text.as_deref(), photo.as_deref())
                    .await
            }
            GatewayEvent::UserSelection { user_id, data } => {
                self.on_user_selection(user_id, &data).await
            }
            GatewayEvent::ChannelReply {
                channel_id,
                replied_to,
                body,
                responder_id,
                responder_label,
            } => {
                self.on_channel_reply(InboundReply {
                    channel_id,
                    replied_to,
                    body,
                    responder_id,
                    responder_label,
                })
                .await
            }
            GatewayEvent::ChannelCommand {
                channel_id,
                sender_id,
                command,
            } => self.on_channel_command(channel_id, sender_id, &command).await,
        }
    }

    async fn on_user_message(
        &self,
        user_id: i64,
        display_name: &str,
        text: Option<&str>,
        photo: Option<&str>,
    ) -> anyhow::Result<()> {
        if let Some(command) = text.map(str::trim).filter(|t| t.starts_with('/')) {
            return self.on_user_command(user_id, display_name, command).await;
        }
        if let Some(photo) = photo {
            return self.advance_intake(user_id, IntakeInput::Photo(photo)).await;
        }
        if let Some(text) = text {
            return self.advance_intake(user_id, IntakeInput::Text(text)).await;
        }
        // sticker, voice note, anything else we cannot use
        self.notify(user_id, "Please send text. Use /new to file a complaint.")
            .await;
        Ok(())
    }

    async fn on_user_command(
        &self,
        user_id: i64,
        display_name: &str,
        command: &str,
    ) -> anyhow::Result<()> {
        match command {
            "/start" => {
                self.sessions.clear(user_id).await;
                let returning =
                    crate::store::mark_onboarded(&self.db, user_id, Some(display_name), Utc::now())
                        .await?;
                let greeting = if returning {
                    format!("Welcome back, {display_name}. Use /new to file a complaint, /my to see your history.")
                } else {
                    format!(
                        "Hello, {display_name}. This service registers citizen complaints and \
                         forwards them to the responsible department.\n\
                         /new - file a complaint\n\
                         /my - your complaints\n\
                         /cancel - abandon the current form"
                    )
                };
                self.notify(user_id, &greeting).await;
            }
            "/new" => {
                match quota::admit(&self.db, user_id, self.config.daily_limit, self.config.timezone, Utc::now())
                    .await?
                {
                    Admission::Allowed => {
                        if self.sessions.is_active(user_id).await {
                            self.notify(user_id, "Restarting the form; earlier answers are discarded.")
                                .await;
                        }
                        let prompt = self.sessions.begin(user_id).await;
                        self.notify(user_id, &prompt).await;
                    }
                    Admission::Denied { used, limit } => {
                        self.notify(
                            user_id,
                            &format!(
                                "Daily limit reached ({used}/{limit}). Please try again tomorrow."
                            ),
                        )
                        .await;
                    }
                }
            }
            "/my" => {
                let listing =
                    commands::my_complaints(&self.db, user_id, self.config.timezone).await?;
                self.notify(user_id, &listing).await;
            }
            "/cancel" => {
                let message = if self.sessions.clear(user_id).await {
                    "Form abandoned. Use /new to start over."
                } else {
                    "Nothing to cancel."
                };
                self.notify(user_id, message).await;
            }
            "/skip" | "/skip_photo" => {
                return self.advance_intake(user_id, IntakeInput::SkipAttachment).await;
            }
            other if other.starts_with("/cat_") => {
                // category prompts list these as typed commands too
                return self.on_user_selection(user_id, other.trim_start_matches('/')).await;
            }
            other => {
                tracing::debug!(user_id, command = other, "runtime: unknown command");
                self.notify(user_id, "Unknown command. Use /new, /my or /cancel.")
                    .await;
            }
        }
        Ok(())
    }

    async fn on_user_selection(&self, user_id: i64, data: &str) -> anyhow::Result<()> {
        if data == "skip_photo" {
            return self.advance_intake(user_id, IntakeInput::SkipAttachment).await;
        }
        if let Some(slug) = data.strip_prefix("cat_") {
            let Some(category) = Category::from_slug(slug) else {
                tracing::warn!(user_id, data, "runtime: selection names no category");
                return Ok(());
            };
            return self
                .advance_intake(user_id, IntakeInput::CategoryChoice(category))
                .await;
        }
        tracing::debug!(user_id, data, "runtime: unrecognized selection");
        Ok(())
    }

    async fn advance_intake(&self, user_id: i64, input: IntakeInput<'_>) -> anyhow::Result<()> {
        match self.sessions.handle(user_id, input).await {
            IntakeEvent::Advanced { prompt } | IntakeEvent::Rejected { prompt } => {
                self.notify(user_id, &prompt).await;
            }
            IntakeEvent::Finalized(draft) => {
                match routing::route(&self.db, self.gateway.as_ref(), &self.config, &draft, Utc::now())
                    .await
                {
                    Ok(routed) => {
                        self.notify(
                            user_id,
                            &format!(
                                "Your complaint #{} has been registered. You will be notified \
                                 when it is answered.",
                                routed.complaint_id
                            ),
                        )
                        .await;
                    }
                    Err(RouteError::Delivery(error)) => {
                        tracing::warn!(user_id, %error, "runtime: submission not routed");
                        self.notify(
                            user_id,
                            "Your complaint could not be submitted right now. Please try /new again later.",
                        )
                        .await;
                    }
                    Err(error @ RouteError::Store { .. }) => {
                        self.notify(
                            user_id,
                            "Your complaint could not be registered. Please try /new again later.",
                        )
                        .await;
                        return Err(error.into());
                    }
                }
            }
            IntakeEvent::Aborted => {
                self.notify(user_id, "Something went wrong with the form. Please start over with /new.")
                    .await;
            }
            IntakeEvent::NoSession => {
                self.notify(user_id, "No form in progress. Use /new to file a complaint.")
                    .await;
            }
        }
        Ok(())
    }

    async fn on_channel_reply(&self, reply: InboundReply) -> anyhow::Result<()> {
        let channel_id = reply.channel_id;
        // message ids are per-chat; a reply in a foreign group can carry a
        // colliding id, so only replies from staff channels may resolve
        if !self.config.is_staff_channel(channel_id) {
            tracing::warn!(
                channel_id,
                replied_to = reply.replied_to,
                responder_id = reply.responder_id,
                "runtime: reply from unknown channel"
            );
            return Ok(());
        }
        let outcome =
            resolve::resolve(&self.db, self.gateway.as_ref(), &self.config, &reply, Utc::now())
                .await?;

        let feedback = match outcome {
            ResolveOutcome::Resolved {
                complaint_id,
                notification: NotificationStatus::Delivered,
                ..
            } => Some(format!("Answer to complaint #{complaint_id} delivered to the citizen.")),
            ResolveOutcome::Resolved {
                complaint_id,
                notification: NotificationStatus::Failed(error),
                ..
            } => Some(format!(
                "Answer to complaint #{complaint_id} recorded, but the citizen could not be reached: {error}."
            )),
            ResolveOutcome::TooShort => {
                Some("Reply too short to forward; please write a full answer.".to_string())
            }
            ResolveOutcome::IntegrityFault { complaint_id, .. } => Some(format!(
                "Answer to complaint #{complaint_id} recorded; no citizen to notify."
            )),
            ResolveOutcome::NoMatch => {
                Some("This reply does not match any registered complaint.".to_string())
            }
        };

        if let Some(feedback) = feedback {
            self.deliver(channel_id, &feedback).await;
        }
        Ok(())
    }

    async fn on_channel_command(
        &self,
        channel_id: i64,
        sender_id: i64,
        command: &str,
    ) -> anyhow::Result<()> {
        if !self.config.is_staff_channel(channel_id) {
            tracing::warn!(channel_id, sender_id, command, "runtime: command from unknown channel");
            return Ok(());
        }

        match command.trim() {
            "/statistics" => {
                let stats =
                    commands::aggregate_stats(&self.db, self.config.timezone, Utc::now()).await?;
                self.deliver(channel_id, &commands::format_statistics(&stats)).await;
            }
            "/export" => {
                let now = Utc::now();
                let snapshot = commands::snapshot(&self.db, self.config.timezone, now).await?;
                let bytes = self.exporter.render(&snapshot)?;
                let file_name = self.exporter.file_name(now);
                match tokio::time::timeout(
                    self.config.gateway_timeout,
                    self.gateway.deliver_document(channel_id, &file_name, bytes),
                )
                .await
                {
                    Ok(Ok(message_id)) => {
                        tracing::info!(channel_id, message_id, file_name, "runtime: export delivered");
                    }
                    Ok(Err(error)) => {
                        tracing::warn!(channel_id, %error, "runtime: export delivery failed");
                    }
                    Err(_) => {
                        tracing::warn!(channel_id, "runtime: export delivery timed out");
                    }
                }
            }
            "/debug" => {
                let overview = commands::recent_overview(&self.db, self.config.timezone).await?;
                self.deliver(channel_id, &overview).await;
            }
            other => {
                tracing::debug!(channel_id, command = other, "runtime: unknown channel command");
            }
        }
        Ok(())
    }

    async fn notify(&self, user_id: i64, text: &str) {
        if let Err(error) = notify_with_timeout(
            self.gateway.as_ref(),
            self.config.gateway_timeout,
            user_id,
            text,
        )
        .await
        {
            tracing::warn!(user_id, %error, "runtime: user notification failed");
        }
    }

    async fn deliver(&self, channel_id: i64, text: &str) {
        if let Err(error) = deliver_with_timeout(
            self.gateway.as_ref(),
            self.config.gateway_timeout,
            channel_id,
            text,
            None,
        )
        .await
        {
            tracing::warn!(channel_id, %error, "runtime: channel message failed");
        }
    }
}
