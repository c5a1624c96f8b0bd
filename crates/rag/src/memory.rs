use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tessera_core::ConversationTurn;
use tracing::debug;

pub const DEFAULT_MAX_TURNS: usize = 5;
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// `subject::user_id::session_id`. Client-chosen session ids only name a
/// conversation inside one caller's tenant scope.
pub fn session_key(subject: &str, user_id: &str, session_id: &str) -> String {
    format!("{subject}::{user_id}::{session_id}")
}

struct Session {
    turns: VecDeque<ConversationTurn>,
    last_seen: Instant,
}

/// Bounded per-session history, lost on restart.
///
/// Sessions idle for longer than the idle TTL read as empty and are dropped
/// once the map grows past `max_sessions`; if every session is still live
/// the least recently used ones go first.
pub struct ConversationMemory {
    max_turns: usize,
    idle_ttl: Duration,
    max_sessions: usize,
    sessions: DashMap<String, Session>,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            idle_ttl: DEFAULT_IDLE_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
            sessions: DashMap::new(),
        }
    }

    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max.max(1);
        self
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Oldest turn first.
    pub fn history(&self, key: &str) -> Vec<ConversationTurn> {
        self.history_at(key, Instant::now())
    }

    pub fn history_at(&self, key: &str, now: Instant) -> Vec<ConversationTurn> {
        match self.sessions.get(key) {
            Some(session) if !self.is_idle(&session, now) => {
                session.turns.iter().cloned().collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn add_turn(&self, key: &str, query: &str, answer: &str) {
        self.add_turn_at(key, query, answer, Instant::now());
    }

    pub fn add_turn_at(&self, key: &str, query: &str, answer: &str, now: Instant) {
        {
            let mut session = self.sessions.entry(key.to_string()).or_insert_with(|| Session {
                turns: VecDeque::new(),
                last_seen: now,
            });
            if self.is_idle(&session, now) {
                session.turns.clear();
            }
            session.last_seen = now;
            session.turns.push_back(ConversationTurn {
                query: query.to_string(),
                answer: answer.to_string(),
            });
            while session.turns.len() > self.max_turns {
                session.turns.pop_front();
            }
        }
        if self.sessions.len() > self.max_sessions {
            self.evict(now);
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn is_idle(&self, session: &Session, now: Instant) -> bool {
        now.saturating_duration_since(session.last_seen) >= self.idle_ttl
    }

    fn evict(&self, now: Instant) {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !self.is_idle(session, now));
        while self.sessions.len() > self.max_sessions {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|entry| entry.last_seen)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.sessions.remove(&key);
                }
                None => break,
            }
        }
        debug!(before, after = self.sessions.len(), "sessions_evicted");
    }
}
