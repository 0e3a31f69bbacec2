use std::collections::VecDeque;

use log::Level;

use crate::dom::{Dom, NodeId};
use crate::location::{FragmentWrite, History, Location, encode_id_fragment};
use crate::timers::TimerQueue;
use crate::{Error, Result};

/// A message the controller emitted for developers (the `console.warn` tier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBlock {
    Start,
    Center,
    End,
    Nearest,
}

/// One `scrollIntoView` request the page carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollRecord {
    pub target: NodeId,
    pub target_id: Option<String>,
    pub behavior: ScrollBehavior,
    pub block: ScrollBlock,
    pub at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HashChange {
    pub(crate) old_url: String,
    pub(crate) new_url: String,
}

/// Browser-owned state the controller reads and writes: the document, the
/// location and its history, timers, the random source, and the sinks for
/// diagnostics, notices, and scrolls.
#[derive(Debug)]
pub(crate) struct Host {
    pub(crate) dom: Dom,
    location: Location,
    history: History,
    pub(crate) timers: TimerQueue,
    rng_state: u64,
    active_element: Option<NodeId>,
    pending_hashchanges: VecDeque<HashChange>,
    diagnostics: Vec<Diagnostic>,
    diagnostic_limit: usize,
    notices: Vec<String>,
    scroll_log: Vec<ScrollRecord>,
    trace: bool,
    trace_events: bool,
    trace_timers: bool,
    trace_logs: Vec<String>,
    trace_log_limit: usize,
    trace_to_stderr: bool,
}

impl Host {
    pub(crate) fn new(dom: Dom, url: &str) -> Result<Self> {
        let location = Location::parse(url)?;
        let history = History::new(location.href());
        Ok(Self {
            dom,
            location,
            history,
            timers: TimerQueue::default(),
            rng_state: 0x9E37_79B9_7F4A_7C15,
            active_element: None,
            pending_hashchanges: VecDeque::new(),
            diagnostics: Vec::new(),
            diagnostic_limit: 1_000,
            notices: Vec::new(),
            scroll_log: Vec::new(),
            trace: false,
            trace_events: true,
            trace_timers: true,
            trace_logs: Vec::new(),
            trace_log_limit: 10_000,
            trace_to_stderr: true,
        })
    }

    pub(crate) fn location_href(&self) -> String {
        self.location.href()
    }

    /// `location.hash`, including the leading `#` when present.
    pub(crate) fn location_hash(&self) -> &str {
        self.location.hash()
    }

    pub(crate) fn history_len(&self) -> usize {
        self.history.len()
    }

    pub(crate) fn history_index(&self) -> usize {
        self.history.index()
    }

    /// Writes the fragment (given without `#`; empty clears it). Existing
    /// `%XX` escapes are kept, as with `location.hash = ...`. Returns whether a
    /// `hashchange` event was queued.
    pub(crate) fn write_fragment(&mut self, fragment: &str, mode: FragmentWrite) -> Result<bool> {
        let next_url = self.location.with_fragment(fragment);
        self.write_url(next_url, mode)
    }

    /// Writes a fragment naming the element `id`. Every `%` in the id is
    /// escaped, so the written URL resolves back to exactly that element.
    pub(crate) fn write_id_fragment(&mut self, id: &str, mode: FragmentWrite) -> Result<bool> {
        let next_url = self.location.with_encoded_fragment(&encode_id_fragment(id));
        self.write_url(next_url, mode)
    }

    fn write_url(&mut self, next_url: String, mode: FragmentWrite) -> Result<bool> {
        let next = Location::parse(&next_url)?;
        let changed = self.location.is_hash_only_change(&next);
        let old_url = self.location.href();
        self.location = next;

        match mode {
            FragmentWrite::Replace => {
                self.history.replace_current(next_url.clone());
                self.trace_event_line(format!("[location] replace {old_url} -> {next_url}"));
                Ok(false)
            }
            FragmentWrite::Assign if !changed => {
                // Same fragment: browsers neither add an entry nor fire hashchange.
                self.trace_event_line(format!("[location] assign unchanged {next_url}"));
                Ok(false)
            }
            FragmentWrite::Assign => {
                self.history.push(next_url.clone());
                self.trace_event_line(format!("[location] assign {old_url} -> {next_url}"));
                self.pending_hashchanges.push_back(HashChange {
                    old_url,
                    new_url: next_url,
                });
                Ok(true)
            }
        }
    }

    /// `history.go(delta)`. Returns whether a `hashchange` event was queued.
    pub(crate) fn traverse_history(&mut self, delta: i64) -> Result<bool> {
        let Some(url) = self.history.go(delta).map(str::to_string) else {
            self.trace_event_line(format!("[location] go({delta}) out of range"));
            return Ok(false);
        };
        let next = Location::parse(&url)?;
        let old_url = self.location.href();
        let hash_only = self.location.is_hash_only_change(&next);
        self.location = next;
        self.trace_event_line(format!("[location] go({delta}) {old_url} -> {url}"));
        if hash_only {
            self.pending_hashchanges.push_back(HashChange {
                old_url,
                new_url: url,
            });
        }
        Ok(hash_only)
    }

    pub(crate) fn take_pending_hashchange(&mut self) -> Option<HashChange> {
        self.pending_hashchanges.pop_front()
    }

    pub(crate) fn set_random_seed(&mut self, seed: u64) {
        self.rng_state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
    }

    /// `Math.random()`: uniform in `[0.0, 1.0)`.
    pub(crate) fn next_random_f64(&mut self) -> f64 {
        // xorshift64*: deterministic PRNG so seeded runs repeat exactly.
        let mut x = self.rng_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng_state = if x == 0 { 0xA5A5_A5A5_A5A5_A5A5 } else { x };
        let out = x.wrapping_mul(0x2545_F491_4F6C_DD1D);
        // Top 53 bits.
        let mantissa = out >> 11;
        (mantissa as f64) * (1.0 / ((1u64 << 53) as f64))
    }

    pub(crate) fn active_element(&self) -> Option<NodeId> {
        self.active_element
    }

    pub(crate) fn focus(&mut self, node: NodeId) {
        self.active_element = Some(node);
    }

    pub(crate) fn blur(&mut self, node: NodeId) {
        if self.active_element == Some(node) {
            self.active_element = None;
        }
    }

    pub(crate) fn scroll_into_view(
        &mut self,
        target: NodeId,
        behavior: ScrollBehavior,
        block: ScrollBlock,
    ) {
        let record = ScrollRecord {
            target,
            target_id: self.dom.id_of(target).map(str::to_string),
            behavior,
            block,
            at_ms: self.timers.now_ms(),
        };
        self.trace_line(format!(
            "[scroll] {} behavior={:?} block={:?} at_ms={}",
            self.dom.node_label(target),
            behavior,
            block,
            record.at_ms
        ));
        self.scroll_log.push(record);
    }

    pub(crate) fn scroll_log(&self) -> &[ScrollRecord] {
        &self.scroll_log
    }

    /// Developer-facing diagnostic: forwarded to the `log` facade and kept in a
    /// bounded buffer for inspection.
    pub(crate) fn diagnose(&mut self, level: Level, message: String) {
        log::log!(target: "chapter_focus", level, "{message}");
        if self.diagnostics.len() >= self.diagnostic_limit {
            self.diagnostics.remove(0);
        }
        self.diagnostics.push(Diagnostic { level, message });
    }

    /// User-visible notice, the `alert()` tier.
    pub(crate) fn notify_user(&mut self, message: String) {
        log::info!(target: "chapter_focus", "notice: {message}");
        self.trace_line(format!("[notice] {message}"));
        self.notices.push(message);
    }

    pub(crate) fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub(crate) fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub(crate) fn set_diagnostic_limit(&mut self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::Runtime(
                "set_diagnostic_limit requires at least 1 entry".into(),
            ));
        }
        self.diagnostic_limit = max_entries;
        while self.diagnostics.len() > self.diagnostic_limit {
            self.diagnostics.remove(0);
        }
        Ok(())
    }

    pub(crate) fn enable_trace(&mut self, enabled: bool) {
        self.trace = enabled;
    }

    pub(crate) fn set_trace_events(&mut self, enabled: bool) {
        self.trace_events = enabled;
    }

    pub(crate) fn set_trace_timers(&mut self, enabled: bool) {
        self.trace_timers = enabled;
    }

    pub(crate) fn set_trace_stderr(&mut self, enabled: bool) {
        self.trace_to_stderr = enabled;
    }

    pub(crate) fn set_trace_log_limit(&mut self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::Runtime(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        self.trace_log_limit = max_entries;
        while self.trace_logs.len() > self.trace_log_limit {
            self.trace_logs.remove(0);
        }
        Ok(())
    }

    pub(crate) fn take_trace_logs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace_logs)
    }

    pub(crate) fn is_tracing(&self) -> bool {
        self.trace
    }

    pub(crate) fn trace_event_line(&mut self, line: String) {
        if self.trace && self.trace_events {
            self.trace_line(line);
        }
    }

    pub(crate) fn trace_timer_line(&mut self, line: String) {
        if self.trace && self.trace_timers {
            self.trace_line(line);
        }
    }

    pub(crate) fn trace_line(&mut self, line: String) {
        if self.trace {
            if self.trace_to_stderr {
                eprintln!("{line}");
            }
            if self.trace_logs.len() >= self.trace_log_limit {
                self.trace_logs.remove(0);
            }
            self.trace_logs.push(line);
        }
    }
}
