//! Quote source collaborators
//!
//! The core never fetches network data itself; upstream adapters implement
//! `QuoteSource` and are injected. A failed fetch is reported synchronously
//! as `success = false`, never as a panic or error.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Raw reading from an upstream price source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Signed so non-positive upstream answers survive until classification
    pub price: i128,
    pub decimals: u32,
    pub updated_at: u64,
    /// Upstream round/sequence identifier; zero is the "no round" sentinel
    pub round_id: u64,
    pub success: bool,
}

impl Quote {
    /// The reading an adapter returns when the upstream call itself failed.
    pub fn failed() -> Self {
        Self {
            price: 0,
            decimals: 0,
            updated_at: 0,
            round_id: 0,
            success: false,
        }
    }
}

/// Capability supplying raw quotes, one instance per upstream.
#[cfg_attr(test, mockall::automock)]
pub trait QuoteSource: Send + Sync {
    /// Source name for logs
    fn name(&self) -> &str;

    /// Latest reading from the upstream.
    fn fetch(&self) -> Quote;
}

/// Deterministic source that replays a scripted sequence of quotes,
/// repeating the final one once the script runs out. Used for tests and
/// dry runs without any upstream.
pub struct ScriptedSource {
    name: String,
    script: Mutex<Script>,
}

struct Script {
    queue: VecDeque<Quote>,
    last: Quote,
}

impl ScriptedSource {
    pub fn new(name: impl Into<String>, quotes: impl IntoIterator<Item = Quote>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(Script {
                queue: quotes.into_iter().collect(),
                last: Quote::failed(),
            }),
        }
    }

    /// Append further quotes to the script.
    pub fn push(&self, quote: Quote) {
        self.script.lock().queue.push_back(quote);
    }
}

impl QuoteSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Quote {
        let mut script = self.script.lock();
        if let Some(quote) = script.queue.pop_front() {
            script.last = quote;
        }
        script.last
    }
}
