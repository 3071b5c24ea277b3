//! Browser user agents and the per-host choice that is known to work.

use rand::seq::SliceRandom;

use crate::services::keyed::KeyedStore;

pub const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36",
];

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Remembers which user agent last got a usable answer from each host
#[derive(Debug, Default)]
pub struct UserAgentStore {
    hosts: KeyedStore<String, String>,
}

impl UserAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, host: &str) -> Option<String> {
        self.hosts.get(&host.to_string()).map(|ua| ua.lock().clone())
    }

    /// Stored agent for `host`, or a random one from the pool
    pub fn pick(&self, host: &str) -> String {
        self.get(host)
            .unwrap_or_else(|| random_user_agent().to_string())
    }

    pub fn remember(&self, host: &str, user_agent: &str) {
        let entry = self
            .hosts
            .get_or_insert_with(&host.to_string(), || user_agent.to_string());
        let mut stored = entry.lock();
        if *stored != user_agent {
            *stored = user_agent.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_agent_comes_from_pool() {
        for _ in 0..20 {
            assert!(USER_AGENTS.contains(&random_user_agent()));
        }
    }

    #[test]
    fn test_remembered_agent_is_sticky() {
        let store = UserAgentStore::new();
        assert!(store.get("tracker.example").is_none());

        store.remember("tracker.example", "Solver/1.0");
        for _ in 0..5 {
            assert_eq!(store.pick("tracker.example"), "Solver/1.0");
        }

        store.remember("tracker.example", "Solver/2.0");
        assert_eq!(store.get("tracker.example").as_deref(), Some("Solver/2.0"));
    }
}
