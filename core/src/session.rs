use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

use crate::{
    clock::{span, Timestamp},
    record::{Record, RecordError, RecordStore},
    taunts::TauntCatalog,
};

/// Timing knobs of the taunting schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// Longest gap between typing signals before a burst counts as abandoned.
    pub grace_period: Duration,
    /// Elapsed typing time before the first taunt.
    pub stop_base: Duration,
    /// Extra elapsed time required for every further taunt.
    pub stop_step: Duration,
    /// Chance that a due taunt is actually sent.
    pub taunt_probability: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(45),
            stop_base: Duration::from_secs(30),
            stop_step: Duration::from_secs(15),
            taunt_probability: 1.0,
        }
    }
}

impl Timing {
    /// Elapsed time at which the next taunt becomes due. Saturates at
    /// [`Duration::MAX`].
    pub fn taunt_threshold(&self, taunts_sent: u32) -> Duration {
        self.stop_step
            .checked_mul(taunts_sent)
            .and_then(|step| self.stop_base.checked_add(step))
            .unwrap_or(Duration::MAX)
    }
}

/// One continuous typing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Burst {
    pub started_at: Timestamp,
    pub last_seen_at: Timestamp,
    pub taunts_sent: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    NotTyping,
    Typing(Burst),
}

impl SessionState {
    pub fn is_typing(&self) -> bool {
        matches!(self, SessionState::Typing(_))
    }

    pub fn burst(&self) -> Option<&Burst> {
        match self {
            SessionState::Typing(burst) => Some(burst),
            SessionState::NotTyping => None,
        }
    }
}

/// What a sent message did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Not the tracked user, or no burst in progress.
    Ignored,
    BurstEnded { duration: Duration },
    NewRecord { duration: Duration },
}

/// Typing-session state machine for the tracked user.
pub struct SessionTracker {
    state: SessionState,
    timing: Timing,
    taunts: TauntCatalog,
    records: RecordStore,
    rng: StdRng,
}

impl SessionTracker {
    pub fn new(timing: Timing, taunts: TauntCatalog, records: RecordStore) -> Self {
        Self {
            state: SessionState::NotTyping,
            timing,
            taunts,
            records,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the random source used for taunt suppression.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn record(&self) -> &Record {
        self.records.current()
    }

    pub fn taunts_mut(&mut self) -> &mut TauntCatalog {
        &mut self.taunts
    }

    /// Handle one typing signal from the tracked user. Returns the taunt to
    /// send, if one became due.
    pub fn on_typing_signal(&mut self, at: Timestamp) -> Option<String> {
        let grace = self.timing.grace_period;
        let silence = self.state.burst().map(|b| span(b.last_seen_at, at));
        if let Some(gap) = silence.filter(|gap| *gap >= grace) {
            debug!("typing burst abandoned after {gap:?} of silence");
            self.state = SessionState::NotTyping;
        }

        if !self.state.is_typing() {
            debug!("typing burst started at {at}");
            self.state = SessionState::Typing(Burst {
                started_at: at,
                last_seen_at: at,
                taunts_sent: 0,
            });
            return None;
        }
        let SessionState::Typing(burst) = &mut self.state else {
            return None;
        };

        // hosts may deliver timestamps out of order
        burst.last_seen_at = burst.last_seen_at.max(at);
        let elapsed = span(burst.started_at, at);
        if elapsed < self.timing.taunt_threshold(burst.taunts_sent) {
            return None;
        }
        let p = self.timing.taunt_probability;
        if p < 1.0 && !self.rng.gen_bool(p.clamp(0.0, 1.0)) {
            return None;
        }
        let taunt = self.taunts.take_and_rotate()?;
        burst.taunts_sent += 1;
        debug!("taunt #{} after {elapsed:?} of typing", burst.taunts_sent);
        Some(taunt)
    }

    /// Handle a message sent in the channel. A message from the tracked user
    /// ends the current burst and may set a new record.
    ///
    /// The session is reset even when persisting the record fails.
    pub async fn on_message_sent(
        &mut self,
        by_tracked_user: bool,
        at: Timestamp,
    ) -> Result<MessageOutcome, RecordError> {
        let burst = match (by_tracked_user, self.state) {
            (true, SessionState::Typing(burst)) => burst,
            _ => return Ok(MessageOutcome::Ignored),
        };
        let duration = span(burst.started_at, at);
        self.state = SessionState::NotTyping;
        debug!("typing burst ended after {duration:?}");

        if self.records.update_if_better(duration, at).await? {
            Ok(MessageOutcome::NewRecord { duration })
        } else {
            Ok(MessageOutcome::BurstEnded { duration })
        }
    }
}
