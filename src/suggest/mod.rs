pub mod dropdown;
pub mod source;

pub use dropdown::{Candidate, CandidateKind, DropdownState};
pub use source::{parse_suggestion_payload, HttpSuggestionSource, SuggestionSource};

use crate::history::HistoryEntry;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// The combined dropdown shows at most this many rows.
pub const MAX_DISPLAYED_ITEMS: usize = 8;

/// A pending debounced fetch. The shell schedules a timer for `delay` and
/// hands the ticket back when it fires; a ticket superseded by newer input
/// is silently dropped.
#[derive(Debug, Clone)]
pub struct DebounceTicket {
    generation: u64,
    pub query: String,
    pub delay: Duration,
}

/// Debounced suggestion engine: immediate history render on input, remote
/// fetch after input inactivity, per-query result cache.
pub struct SuggestEngine {
    source: Box<dyn SuggestionSource>,
    cache: HashMap<String, Vec<String>>,
    generation: u64,
    debounce: Duration,
}

impl SuggestEngine {
    pub fn new(source: Box<dyn SuggestionSource>, debounce: Duration) -> Self {
        Self {
            source,
            cache: HashMap::new(),
            generation: 0,
            debounce,
        }
    }

    /// Handle an input change. Returns the candidates to render right away
    /// (filtered history, seeded with the literal query when history has
    /// nothing) and, for non-empty input, the debounce ticket for the remote
    /// fetch. Any previously issued ticket becomes stale.
    pub fn on_input(
        &mut self,
        query: &str,
        filtered_history: &[HistoryEntry],
    ) -> (Vec<Candidate>, Option<DebounceTicket>) {
        self.generation += 1;
        let query = query.trim();

        if query.is_empty() {
            return (merge_candidates(filtered_history, &[]), None);
        }

        let seed: Vec<String> = if filtered_history.is_empty() {
            vec![query.to_string()]
        } else {
            Vec::new()
        };
        let immediate = merge_candidates(filtered_history, &seed);

        let ticket = DebounceTicket {
            generation: self.generation,
            query: query.to_string(),
            delay: self.debounce,
        };
        (immediate, Some(ticket))
    }

    /// Handle a fired debounce timer. Returns `None` when the ticket was
    /// superseded by newer input; otherwise the re-merged candidate list.
    /// Fetch failures degrade to an empty suggestion list.
    pub fn on_debounce(
        &mut self,
        ticket: &DebounceTicket,
        fresh_history: &[HistoryEntry],
    ) -> Option<Vec<Candidate>> {
        if ticket.generation != self.generation {
            debug!("Skipping stale suggestion fetch for '{}'", ticket.query);
            return None;
        }

        let suggestions = match self.cache.get(&ticket.query) {
            Some(cached) => cached.clone(),
            None => {
                let fetched = self.source.fetch(&ticket.query).unwrap_or_else(|e| {
                    warn!("Suggestion fetch for '{}' failed: {}", ticket.query, e);
                    Vec::new()
                });
                self.cache.insert(ticket.query.clone(), fetched.clone());
                fetched
            }
        };

        // Seed the literal query up front unless an exact match is already
        // somewhere in the combined set.
        let has_exact = fresh_history
            .iter()
            .any(|h| h.query.eq_ignore_ascii_case(&ticket.query))
            || suggestions
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&ticket.query));
        let final_suggestions: Vec<String> = if has_exact {
            suggestions
        } else {
            std::iter::once(ticket.query.clone())
                .chain(suggestions)
                .collect()
        };

        Some(merge_candidates(fresh_history, &final_suggestions))
    }
}

/// Combine history and suggestions into the rendered list: history first
/// (up to the display cap), suggestions filling the remaining rows, dropping
/// any suggestion that case-insensitively duplicates a history entry.
pub fn merge_candidates(history: &[HistoryEntry], suggestions: &[String]) -> Vec<Candidate> {
    let mut items: Vec<Candidate> = history
        .iter()
        .take(MAX_DISPLAYED_ITEMS)
        .map(|entry| Candidate::history(entry.query.clone()))
        .collect();

    let remaining = MAX_DISPLAYED_ITEMS - items.len();
    let extra = suggestions
        .iter()
        .take(remaining)
        .filter(|suggestion| {
            !history
                .iter()
                .any(|entry| entry.query.eq_ignore_ascii_case(suggestion.as_str()))
        })
        .map(|suggestion| Candidate::suggestion(suggestion.as_str()));
    items.extend(extra);

    items
}
