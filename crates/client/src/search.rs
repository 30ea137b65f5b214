//! Incremental name search with debounce and stale-response discard.
//!
//! Every keystroke that leaves a non-empty query mints a new token. A lookup
//! is issued for a token only if no newer keystroke arrived during the
//! debounce window, and a response is adopted only if its token is the one
//! most recently issued. Responses may therefore arrive in any order without
//! an older query overwriting a newer one.

use crate::notifications::NotificationLog;
use crate::remote::RemoteCollection;
use protocol::Employee;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Strictly increasing per search box.
pub type Token = u64;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchPhase {
    /// Empty query, empty results
    #[default]
    Idle,
    /// Waiting for the debounce window of this token to elapse
    Debouncing(Token),
    /// Lookup in flight
    Pending { token: Token, query: String },
    /// Results of this token are current
    Settled(Token),
    /// Lookup for this token failed; results are unchanged
    Failed(Token),
}

/// Token state machine behind `IncrementalSearch`. Pure; the driver owns
/// the timers and the remote calls.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    query: String,
    phase: SearchPhase,
    last_minted: Token,
    issued: Option<Token>,
    issued_query: Option<String>,
    last_applied: Option<Token>,
    results: Vec<Employee>,
}

impl SearchState {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn phase(&self) -> &SearchPhase {
        &self.phase
    }

    pub fn results(&self) -> &[Employee] {
        &self.results
    }

    /// Token of the most recently issued lookup, if its result may still be adopted.
    pub fn pending_token(&self) -> Option<Token> {
        self.issued.filter(|token| self.last_applied != Some(*token))
    }

    pub fn last_applied_token(&self) -> Option<Token> {
        self.last_applied
    }

    /// Record new input. Returns the token to debounce, or `None` when the
    /// query became empty and the state was reset.
    pub fn query_changed(&mut self, text: &str) -> Option<Token> {
        self.query = text.to_string();

        if self.query.is_empty() {
            // Whatever is in flight can no longer be adopted
            self.phase = SearchPhase::Idle;
            self.issued = None;
            self.issued_query = None;
            self.results.clear();
            return None;
        }

        self.last_minted += 1;
        self.phase = SearchPhase::Debouncing(self.last_minted);
        Some(self.last_minted)
    }

    /// The debounce window for `token` elapsed. Returns the query to look up,
    /// or `None` if a newer keystroke superseded it or the query is the one
    /// already issued.
    pub fn debounce_elapsed(&mut self, token: Token) -> Option<String> {
        if self.phase != SearchPhase::Debouncing(token) {
            return None;
        }

        if let (Some(issued), Some(issued_query)) = (self.issued, &self.issued_query) {
            if *issued_query == self.query {
                self.phase = if self.last_applied == Some(issued) {
                    SearchPhase::Settled(issued)
                } else {
                    SearchPhase::Pending {
                        token: issued,
                        query: issued_query.clone(),
                    }
                };
                return None;
            }
        }

        self.issued = Some(token);
        self.issued_query = Some(self.query.clone());
        self.phase = SearchPhase::Pending {
            token,
            query: self.query.clone(),
        };
        Some(self.query.clone())
    }

    /// Adopt `results` if `token` is the most recently issued lookup.
    /// Returns false for stale responses, which leave the state untouched.
    pub fn apply_results(&mut self, token: Token, results: Vec<Employee>) -> bool {
        if self.issued != Some(token) {
            return false;
        }

        self.results = results;
        self.last_applied = Some(token);
        if matches!(&self.phase, SearchPhase::Pending { token: t, .. } if *t == token) {
            self.phase = SearchPhase::Settled(token);
        }
        true
    }

    /// Record a failed lookup. Results are kept; the same query may be
    /// issued again. Returns false for stale tokens.
    pub fn apply_failure(&mut self, token: Token) -> bool {
        if self.issued != Some(token) {
            return false;
        }

        self.issued_query = None;
        if matches!(&self.phase, SearchPhase::Pending { token: t, .. } if *t == token) {
            self.phase = SearchPhase::Failed(token);
        }
        true
    }
}

/// Drives a `SearchState` from query-text events for one search box.
pub struct IncrementalSearch {
    remote: Arc<dyn RemoteCollection>,
    log: NotificationLog,
    state: Arc<watch::Sender<SearchState>>,
    debounce: Duration,
    timer: Option<JoinHandle<()>>,
}

impl IncrementalSearch {
    pub fn new(
        remote: Arc<dyn RemoteCollection>,
        log: NotificationLog,
        debounce: Duration,
    ) -> Self {
        IncrementalSearch {
            remote,
            log,
            state: Arc::new(watch::Sender::new(SearchState::default())),
            debounce,
            timer: None,
        }
    }

    /// Feed the full text of the search box after an edit. Must be called
    /// from within a tokio runtime.
    pub fn on_query_changed(&mut self, text: &str) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        let mut minted = None;
        self.state.send_modify(|state| minted = state.query_changed(text));
        let Some(token) = minted else {
            tracing::debug!("Search cleared");
            return;
        };

        let remote = self.remote.clone();
        let state = self.state.clone();
        let log = self.log.clone();
        let debounce = self.debounce;

        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            let mut query = None;
            state.send_if_modified(|s| {
                let before = s.phase.clone();
                query = s.debounce_elapsed(token);
                s.phase != before
            });

            // The lookup runs detached: a newer keystroke must not abort it,
            // its response is discarded on arrival instead
            if let Some(query) = query {
                tokio::spawn(lookup(remote, state, log, token, query));
            }
        }));
    }

    /// Equivalent to erasing the search box.
    pub fn clear(&mut self) {
        self.on_query_changed("");
    }

    pub fn results(&self) -> Vec<Employee> {
        self.state.borrow().results().to_vec()
    }

    pub fn snapshot(&self) -> SearchState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }
}

impl Drop for IncrementalSearch {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

async fn lookup(
    remote: Arc<dyn RemoteCollection>,
    state: Arc<watch::Sender<SearchState>>,
    log: NotificationLog,
    token: Token,
    query: String,
) {
    tracing::debug!("Search {} issued for \"{}\"", token, query);

    match remote.list(Some(&query)).await {
        Ok(employees) => {
            let count = employees.len();
            if state.send_if_modified(|s| s.apply_results(token, employees)) {
                log.add(format!("found {count} employees matching \"{query}\""))
                    .await;
            } else {
                tracing::debug!("Discarding stale results of search {}", token);
            }
        }
        Err(e) => {
            if state.send_if_modified(|s| s.apply_failure(token)) {
                tracing::warn!("Search {} failed: {}", token, e);
                log.add(format!("search for \"{query}\" failed: {e}")).await;
            } else {
                tracing::debug!("Ignoring failure of stale search {}: {}", token, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employees(names: &[&str]) -> Vec<Employee> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Employee::new(i as i64 + 1, *name))
            .collect()
    }

    #[test]
    fn test_tokens_strictly_increase() {
        let mut state = SearchState::default();
        let t1 = state.query_changed("M").unwrap();
        let t2 = state.query_changed("Ma").unwrap();
        state.query_changed("");
        let t3 = state.query_changed("Mag").unwrap();

        assert!(t1 < t2 && t2 < t3);
    }

    #[test]
    fn test_superseded_timer_issues_nothing() {
        let mut state = SearchState::default();
        let t1 = state.query_changed("M").unwrap();
        let t2 = state.query_changed("Ma").unwrap();

        assert_eq!(state.debounce_elapsed(t1), None);
        assert_eq!(state.debounce_elapsed(t2), Some("Ma".to_string()));
        assert_eq!(
            state.phase(),
            &SearchPhase::Pending {
                token: t2,
                query: "Ma".to_string()
            }
        );
    }

    #[test]
    fn test_older_response_after_newer_is_discarded() {
        let mut state = SearchState::default();
        let t1 = state.query_changed("Ma").unwrap();
        state.debounce_elapsed(t1);
        let t2 = state.query_changed("Mag").unwrap();
        state.debounce_elapsed(t2);

        assert!(state.apply_results(t2, employees(&["Magneta", "Magma"])));
        let stale = employees(&["Magneta", "RubberMan", "Dynama", "Magma"]);
        assert!(!state.apply_results(t1, stale));

        assert_eq!(state.results().len(), 2);
        assert_eq!(state.phase(), &SearchPhase::Settled(t2));
        assert_eq!(state.last_applied_token(), Some(t2));
    }

    #[test]
    fn test_older_response_before_newer_is_also_discarded() {
        let mut state = SearchState::default();
        let t1 = state.query_changed("Ma").unwrap();
        state.debounce_elapsed(t1);
        let t2 = state.query_changed("Mag").unwrap();
        state.debounce_elapsed(t2);

        assert!(!state.apply_results(t1, employees(&["a", "b", "c", "d"])));
        assert!(state.results().is_empty());
        assert_eq!(state.pending_token(), Some(t2));
    }

    #[test]
    fn test_response_for_issued_token_applies_while_next_is_debouncing() {
        let mut state = SearchState::default();
        let t1 = state.query_changed("Ma").unwrap();
        state.debounce_elapsed(t1);
        let t2 = state.query_changed("Mag").unwrap();

        assert!(state.apply_results(t1, employees(&["a", "b", "c", "d"])));
        assert_eq!(state.results().len(), 4);
        assert_eq!(state.phase(), &SearchPhase::Debouncing(t2));
    }

    #[test]
    fn test_clearing_resets_and_invalidates_in_flight() {
        let mut state = SearchState::default();
        let t1 = state.query_changed("Ma").unwrap();
        state.debounce_elapsed(t1);
        assert!(state.apply_results(t1, employees(&["Magneta"])));

        let t2 = state.query_changed("Mag").unwrap();
        state.debounce_elapsed(t2);
        assert_eq!(state.query_changed(""), None);

        assert_eq!(state.phase(), &SearchPhase::Idle);
        assert!(state.results().is_empty());
        assert_eq!(state.pending_token(), None);
        assert!(!state.apply_results(t2, employees(&["Magneta"])));
        assert!(state.results().is_empty());
    }

    #[test]
    fn test_same_query_is_not_issued_twice() {
        let mut state = SearchState::default();
        let t1 = state.query_changed("Ma").unwrap();
        state.debounce_elapsed(t1);
        state.apply_results(t1, employees(&["Magneta"]));

        // "Mag" then back to "Ma" inside one debounce window
        state.query_changed("Mag");
        let t3 = state.query_changed("Ma").unwrap();

        assert_eq!(state.debounce_elapsed(t3), None);
        assert_eq!(state.phase(), &SearchPhase::Settled(t1));
        assert_eq!(state.results().len(), 1);
    }

    #[test]
    fn test_failure_keeps_results_and_allows_retry() {
        let mut state = SearchState::default();
        let t1 = state.query_changed("Ma").unwrap();
        state.debounce_elapsed(t1);
        state.apply_results(t1, employees(&["Magneta"]));

        let t2 = state.query_changed("Mag").unwrap();
        state.debounce_elapsed(t2);
        assert!(state.apply_failure(t2));
        assert_eq!(state.phase(), &SearchPhase::Failed(t2));
        assert_eq!(state.results().len(), 1);

        state.query_changed("Ma");
        let t4 = state.query_changed("Mag").unwrap();
        assert_eq!(state.debounce_elapsed(t4), Some("Mag".to_string()));
    }

    #[test]
    fn test_stale_failure_is_ignored() {
        let mut state = SearchState::default();
        let t1 = state.query_changed("Ma").unwrap();
        state.debounce_elapsed(t1);
        let t2 = state.query_changed("Mag").unwrap();
        state.debounce_elapsed(t2);

        assert!(!state.apply_failure(t1));
        assert_eq!(
            state.phase(),
            &SearchPhase::Pending {
                token: t2,
                query: "Mag".to_string()
            }
        );
    }
}
