//! Per-session cap on distinct hashes opened per scope.
//!
//! Each session keeps a ledger of the distinct hashes it asked for in a
//! scope. A new hash is appended even past the limit, and access is granted
//! iff the ledger holds at most `max_hash_access` hashes. Once a session
//! goes over, every lookup in that scope is denied until the session ends.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};

use crate::collaborators::{FormDefinitions, SessionStore};
use crate::config::{LimiterConfig, SETTING_DISABLE_HASH_LIMIT};
use crate::indexer::sanitize;

/// Case-insensitive user-agent pattern treated as automated traffic.
pub const DEFAULT_BOT_PATTERN: &str = "bot|crawl|python";

const LEDGER_KEY_PREFIX: &str = "accessed_hashes_";

/// Ledger updates for the same (session, scope) serialize on one stripe.
const LOCK_STRIPES: usize = 64;

/// Longest user-agent prefix written to the log.
const MAX_LOGGED_AGENT_CHARS: usize = 256;

/// Client-supplied agent made safe for log viewers: truncated, control
/// characters dropped, markup escaped.
fn loggable_agent(user_agent: &str) -> String {
    let clipped: String = user_agent
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_LOGGED_AGENT_CHARS)
        .collect();
    sanitize(&clipped)
}

/// Decides whether a user agent belongs to an automated client.
pub trait BotFilter: Send + Sync {
    fn is_automated(&self, user_agent: &str) -> bool;
}

/// Regex-based bot filter.
#[derive(Debug, Clone)]
pub struct PatternBotFilter {
    pattern: Regex,
}

impl PatternBotFilter {
    /// Build from a pattern matched case-insensitively anywhere in the agent.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self { pattern })
    }
}

impl Default for PatternBotFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BOT_PATTERN).expect("default bot pattern compiles")
    }
}

impl BotFilter for PatternBotFilter {
    fn is_automated(&self, user_agent: &str) -> bool {
        self.pattern.is_match(user_agent)
    }
}

/// Who is asking, as far as the limiter cares.
#[derive(Clone, Copy)]
pub struct Caller<'a> {
    /// Holds the "bypass hash access limit" capability
    pub bypass_limit: bool,
    pub user_agent: Option<&'a str>,
    /// Only used in log lines
    pub client_ip: Option<&'a str>,
    pub session: &'a dyn SessionStore,
}

impl<'a> Caller<'a> {
    pub fn new(session: &'a dyn SessionStore) -> Self {
        Self { bypass_limit: false, user_agent: None, client_ip: None, session }
    }

    pub fn user_agent(mut self, user_agent: &'a str) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    pub fn client_ip(mut self, ip: &'a str) -> Self {
        self.client_ip = Some(ip);
        self
    }

    pub fn bypass(mut self) -> Self {
        self.bypass_limit = true;
        self
    }
}

/// Gate in front of hash lookups.
pub struct AccessLimiter {
    forms: Arc<dyn FormDefinitions>,
    bot_filter: Box<dyn BotFilter>,
    config: LimiterConfig,
    stripes: Vec<Mutex<()>>,
}

impl AccessLimiter {
    pub fn new(forms: Arc<dyn FormDefinitions>, config: LimiterConfig) -> Self {
        Self::with_bot_filter(forms, config, Box::new(PatternBotFilter::default()))
    }

    pub fn with_bot_filter(
        forms: Arc<dyn FormDefinitions>,
        config: LimiterConfig,
        bot_filter: Box<dyn BotFilter>,
    ) -> Self {
        if let Err(reason) = config.validate() {
            log::warn!("Invalid limiter config ({}); lookups will be denied", reason);
        }
        Self {
            forms,
            bot_filter,
            config,
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Whether `caller` may open `hash` in `scope`. Records the hash when it may be counted.
    pub fn has_access(&self, caller: &Caller<'_>, scope: &str, hash: &str) -> bool {
        if caller.bypass_limit {
            return true;
        }

        if self.limit_disabled(scope) {
            return true;
        }

        // Crawlers rotate sessions, so a ledger would only fill up with their hits
        let user_agent = caller.user_agent.map(str::trim).unwrap_or("");
        if user_agent.is_empty() || self.bot_filter.is_automated(user_agent) {
            log::warn!("Bot access blocked for user agent '{}'", loggable_agent(user_agent));
            return false;
        }

        let ledger_len = {
            let _guard = self.stripe(caller.session.session_id(), scope).lock();
            self.record_hash(caller.session, scope, hash)
        };

        let allowed = ledger_len <= self.config.max_hash_access;
        if !allowed {
            log::warn!(
                "Hash access limit reached for ip {} on '{}'",
                caller.client_ip.unwrap_or("unknown"),
                scope
            );
        }
        allowed
    }

    fn limit_disabled(&self, scope: &str) -> bool {
        match self.forms.setting(scope, SETTING_DISABLE_HASH_LIMIT) {
            Ok(value) => value.map_or(false, |v| v.is_on()),
            Err(e) => {
                log::error!("Cannot read hash limit setting of '{}': {}", scope, e);
                false
            }
        }
    }

    fn stripe(&self, session_id: &str, scope: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        (session_id, scope).hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % self.stripes.len()]
    }

    /// Add `hash` to the session ledger for `scope` if new; returns the ledger size.
    ///
    /// Session store failures count as a ledger holding only `hash`.
    fn record_hash(&self, session: &dyn SessionStore, scope: &str, hash: &str) -> usize {
        let key = format!("{}{}", LEDGER_KEY_PREFIX, scope);

        let mut ledger = match session.get(&key) {
            Ok(ledger) => ledger.unwrap_or_default(),
            Err(e) => {
                log::warn!("Hash ledger read failed: {}", e);
                return 1;
            }
        };

        if ledger.iter().any(|h| h == hash) {
            return ledger.len();
        }

        ledger.push(hash.to_string());
        let len = ledger.len();
        if let Err(e) = session.set(&key, ledger) {
            log::warn!("Hash ledger write failed: {}", e);
            return 1;
        }
        len
    }
}
