use super::*;

/// Outcome of folding a session candidate into a key's live sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMerge {
    /// The window the record ends up in.
    pub merged: TimeWindow,
    /// Live sessions swallowed by `merged`. Their accumulators must move into
    /// `merged` and their timers must be cancelled.
    pub absorbed: Vec<TimeWindow>,
}

impl SessionMerge {
    /// True when the candidate fell entirely inside one live session, so no
    /// state moves and no timer changes.
    pub fn is_noop(&self) -> bool {
        self.absorbed.len() == 1 && self.absorbed[0] == self.merged
    }
}

/// Merge `candidate` with every session in `live` it (transitively) touches.
///
/// `live` holds the current, pairwise disjoint sessions of one key. The
/// cover is widened until no remaining session intersects it.
pub fn merge_session_windows(live: &[TimeWindow], candidate: TimeWindow) -> SessionMerge {
    let mut merged = candidate;
    let mut absorbed: Vec<TimeWindow> = Vec::new();
    let mut remaining: Vec<&TimeWindow> = live.iter().collect();

    loop {
        let (hits, rest): (Vec<&TimeWindow>, Vec<&TimeWindow>) =
            remaining.into_iter().partition(|w| w.intersects(&merged));
        if hits.is_empty() {
            break;
        }
        for w in hits {
            merged = merged.cover(w);
            absorbed.push(w.clone());
        }
        remaining = rest;
    }

    absorbed.sort();
    SessionMerge { merged, absorbed }
}
