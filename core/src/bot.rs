use std::time::Duration;

use chat_api::{
    ChatUser, Envelope, MessagePayload, Metadata, ReadyPayload, TypingPayload, TOPIC_MESSAGE,
    TOPIC_READY, TOPIC_TYPING,
};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::{
    chat::ChatChannel,
    clock::{Clock, SystemClock, Timestamp},
    commands::{self, Command},
    config::Config,
    record::{Record, RecordStore},
    session::{MessageOutcome, SessionTracker},
    taunts::TauntCatalog,
};

/// Text posted when the tracked user sets a new record.
pub fn record_announcement(name: &str, duration: Duration) -> String {
    format!(
        "{name} just set a new \"**{name}** is typing...\" record!!! {:.2} seconds!",
        duration.as_secs_f64()
    )
}

/// Reply to `!record`.
pub fn record_summary(name: &str, record: &Record) -> String {
    match record.set_at {
        Some(set_at) => format!(
            "Current \"**{name}** is typing...\" record: {:.2} seconds, set {}.",
            record.best_duration.as_secs_f64(),
            set_at.to_rfc3339()
        ),
        None => format!("No \"**{name}** is typing...\" record yet."),
    }
}

/// Routes gateway events for one tracked user into the session tracker.
pub struct Bot<C = SystemClock> {
    tracked_user: ChatUser,
    owner: Option<ChatUser>,
    tracker: SessionTracker,
    clock: C,
}

impl Bot<SystemClock> {
    /// Build the bot from resolved configuration. A missing or unreadable
    /// record file never prevents startup.
    pub async fn from_config(config: &Config) -> Self {
        let records = RecordStore::load_or_default(&config.record_file).await;
        let taunts = TauntCatalog::new(config.taunts.clone(), &mut rand::thread_rng());
        let tracker = SessionTracker::new(config.timing, taunts, records);
        Self::new(
            config.tracked_user.clone(),
            config.owner.clone(),
            tracker,
            SystemClock::new(config.timezone),
        )
    }
}

impl<C: Clock> Bot<C> {
    pub fn new(
        tracked_user: ChatUser,
        owner: Option<ChatUser>,
        tracker: SessionTracker,
        clock: C,
    ) -> Self {
        Self {
            tracked_user,
            owner,
            tracker,
            clock,
        }
    }

    /// Metadata announced in `bot.init`.
    pub fn metadata() -> Metadata {
        Metadata {
            id: env!("CARGO_PKG_NAME").into(),
            name: "Typing Record Bot".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            needs: vec![TOPIC_TYPING.into(), TOPIC_MESSAGE.into()],
        }
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Handle one event to completion, including any message it triggers.
    pub async fn handle_event(&mut self, env: &Envelope, chat: &dyn ChatChannel) {
        match env.topic.as_deref() {
            Some(TOPIC_TYPING) => {
                if let Some(payload) = payload::<TypingPayload>(env) {
                    self.on_typing(payload, chat).await;
                }
            }
            Some(TOPIC_MESSAGE) => {
                if let Some(payload) = payload::<MessagePayload>(env) {
                    self.on_message(payload, chat).await;
                }
            }
            Some(TOPIC_READY) => {
                self.on_ready(payload::<ReadyPayload>(env).unwrap_or_default());
            }
            other => debug!("ignoring event {other:?}"),
        }
    }

    fn on_ready(&self, payload: ReadyPayload) {
        match payload.user {
            Some(user) => info!("successfully logged in as {user}"),
            None => info!("chat gateway ready"),
        }
        info!("watching {} for typing", self.tracked_user);
    }

    async fn on_typing(&mut self, payload: TypingPayload, chat: &dyn ChatChannel) {
        if payload.user != self.tracked_user {
            return;
        }
        let at = self.timestamp(payload.at);
        if let Some(taunt) = self.tracker.on_typing_signal(at) {
            deliver(chat, &payload.channel_id, &taunt).await;
        }
    }

    async fn on_message(&mut self, payload: MessagePayload, chat: &dyn ChatChannel) {
        let at = self.timestamp(payload.at);
        let by_tracked_user = payload.author == self.tracked_user;
        match self.tracker.on_message_sent(by_tracked_user, at).await {
            Ok(MessageOutcome::NewRecord { duration }) => {
                info!("new typing record: {:.2}s", duration.as_secs_f64());
                let text = record_announcement(&self.tracked_user.name, duration);
                deliver(chat, &payload.channel_id, &text).await;
            }
            Ok(MessageOutcome::BurstEnded { duration }) => {
                debug!("burst of {:.2}s did not beat the record", duration.as_secs_f64());
            }
            Ok(MessageOutcome::Ignored) => {}
            Err(err) => error!("not announcing record: {err}"),
        }

        if let Some(command) = commands::parse(&payload.content) {
            self.on_command(command, &payload, chat).await;
        }
    }

    async fn on_command(&mut self, command: Command, payload: &MessagePayload, chat: &dyn ChatChannel) {
        let reply = match command {
            Command::Record => record_summary(&self.tracked_user.name, self.tracker.record()),
            Command::AddTaunt(text) => {
                if self.owner.as_ref() != Some(&payload.author) {
                    debug!("ignoring !taunt from non-owner {}", payload.author);
                    return;
                }
                let taunts = self.tracker.taunts_mut();
                taunts.add(text);
                format!("Added taunt #{}.", taunts.len())
            }
        };
        deliver(chat, &payload.channel_id, &reply).await;
    }

    fn timestamp(&self, at: Option<Timestamp>) -> Timestamp {
        at.unwrap_or_else(|| self.clock.now())
    }
}

fn payload<T: DeserializeOwned>(env: &Envelope) -> Option<T> {
    let value = env.payload.clone()?;
    match serde_json::from_value(value) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!("dropping malformed {:?} event: {err}", env.topic);
            None
        }
    }
}

async fn deliver(chat: &dyn ChatChannel, channel_id: &str, text: &str) {
    if let Err(err) = chat.send(channel_id, text).await {
        warn!("failed to send to {channel_id}: {err}");
    }
}
