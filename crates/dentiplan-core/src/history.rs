//! Per-session chat history with a fixed retention window.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One user message and the answer it received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only history per session. Oldest exchanges are dropped past the window.
#[derive(Debug)]
pub struct ChatHistory {
    window: usize,
    sessions: Mutex<HashMap<Uuid, VecDeque<Exchange>>>,
}

impl ChatHistory {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Record an exchange for `session`.
    pub fn append(&self, session: Uuid, user: impl Into<String>, assistant: impl Into<String>) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let exchanges = sessions.entry(session).or_default();
        exchanges.push_back(Exchange {
            user: user.into(),
            assistant: assistant.into(),
            recorded_at: Utc::now(),
        });
        while exchanges.len() > self.window {
            exchanges.pop_front();
        }
    }

    /// The last `n` exchanges of `session`, oldest first.
    pub fn recent(&self, session: Uuid, n: usize) -> Vec<Exchange> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(&session)
            .map(|exchanges| {
                let skip = exchanges.len().saturating_sub(n);
                exchanges.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self, session: Uuid) -> usize {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.get(&session).map_or(0, VecDeque::len)
    }

    /// Forget a session entirely.
    pub fn clear(&self, session: Uuid) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(&session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_window_drops_oldest() {
        let history = ChatHistory::new(2);
        let session = Uuid::new_v4();
        history.append(session, "q1", "a1");
        history.append(session, "q2", "a2");
        history.append(session, "q3", "a3");

        let recent = history.recent(session, 10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].user, "q2");
        assert_eq!(recent[1].assistant, "a3");
    }

    #[test]
    fn test_recent_returns_last_n() {
        let history = ChatHistory::new(10);
        let session = Uuid::new_v4();
        for i in 0..5 {
            history.append(session, format!("q{i}"), format!("a{i}"));
        }
        let users: Vec<String> = history.recent(session, 2).into_iter().map(|e| e.user).collect();
        assert_eq!(users, vec!["q3", "q4"]);
        assert!(history.recent(session, 0).is_empty());
    }

    #[test]
    fn test_sessions_are_independent() {
        let history = ChatHistory::new(3);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        history.append(a, "qa", "aa");
        assert_eq!(history.len(a), 1);
        assert_eq!(history.len(b), 0);
        assert!(history.recent(b, 3).is_empty());

        history.clear(a);
        assert_eq!(history.len(a), 0);
    }

    #[test]
    fn test_concurrent_appends_serialize() {
        let history = Arc::new(ChatHistory::new(100));
        let session = Uuid::new_v4();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let history = Arc::clone(&history);
                thread::spawn(move || {
                    for i in 0..10 {
                        history.append(session, format!("{t}-{i}"), "ok");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(history.len(session), 40);
    }
}
