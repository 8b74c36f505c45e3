use std::collections::VecDeque;

use rand::{seq::SliceRandom, Rng};

/// Taunts used when the configuration does not provide any.
pub const DEFAULT_TAUNTS: &[&str] = &[
    "Stop.",
    "Uh oh.",
    "Incoming.",
    "Get ready.",
    "Here we go ...",
    "-_-",
    "Plz no.",
];

/// Ring of taunt strings.
///
/// The order is shuffled once when the catalog is built; every selection then
/// takes the front entry and moves it to the back. With `N` entries each taunt
/// comes up exactly once per `N` selections and never twice inside a window
/// shorter than `N`.
#[derive(Debug, Clone)]
pub struct TauntCatalog {
    ring: VecDeque<String>,
}

impl TauntCatalog {
    pub fn new<R: Rng + ?Sized>(taunts: Vec<String>, rng: &mut R) -> Self {
        let mut taunts = taunts;
        taunts.shuffle(rng);
        Self {
            ring: taunts.into(),
        }
    }

    /// Catalog holding [`DEFAULT_TAUNTS`].
    pub fn with_defaults<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::new(DEFAULT_TAUNTS.iter().map(|s| s.to_string()).collect(), rng)
    }

    /// Select the next taunt. `None` only when the catalog is empty.
    pub fn take_and_rotate(&mut self) -> Option<String> {
        let taunt = self.ring.pop_front()?;
        self.ring.push_back(taunt.clone());
        Some(taunt)
    }

    /// Append a taunt; it is served after every entry already queued.
    pub fn add(&mut self, taunt: String) {
        self.ring.push_back(taunt);
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}
