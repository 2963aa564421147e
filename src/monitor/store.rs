//! Bounded per-symbol signal history shared between workers and the
//! consolidator.
//!
//! One coarse mutex guards the whole map; write frequency is at most one
//! signal per symbol per bar close, so contention is negligible. No signal
//! is read or mutated outside the lock.

use crate::models::TradeSignal;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub struct SignalStore {
    capacity: usize,
    inner: Mutex<HashMap<String, VecDeque<TradeSignal>>>,
}

impl SignalStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Append a signal to its symbol's history.
    ///
    /// Returns `false` without modifying the store when a signal for the
    /// same (symbol, bar_time) pair already exists. Oldest entries are
    /// evicted once the per-symbol capacity is exceeded.
    pub fn push(&self, signal: TradeSignal) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let history = inner.entry(signal.symbol.clone()).or_default();

        if history.iter().any(|s| s.bar_time == signal.bar_time) {
            return false;
        }

        history.push_back(signal);
        while history.len() > self.capacity {
            history.pop_front();
        }
        true
    }

    /// Most recent signal for a symbol
    pub fn latest(&self, symbol: &str) -> Option<TradeSignal> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(symbol).and_then(|h| h.back().cloned())
    }

    /// Flip every unconsumed signal to consumed and return them,
    /// grouped in symbol order. One atomic sweep per batch window.
    pub fn take_unconsumed(&self) -> Vec<TradeSignal> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut swept = Vec::new();

        let mut symbols: Vec<&String> = inner.keys().collect();
        symbols.sort();
        let symbols: Vec<String> = symbols.into_iter().cloned().collect();

        for symbol in symbols {
            if let Some(history) = inner.get_mut(&symbol) {
                for signal in history.iter_mut().filter(|s| !s.consumed) {
                    signal.consumed = true;
                    swept.push(signal.clone());
                }
            }
        }
        swept
    }

    /// Read-only copy of the full history, taken under the lock
    pub fn snapshot(&self) -> HashMap<String, Vec<TradeSignal>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .iter()
            .map(|(symbol, history)| (symbol.clone(), history.iter().cloned().collect()))
            .collect()
    }

    pub fn total(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.values().map(|h| h.len()).sum()
    }
}
