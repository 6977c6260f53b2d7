//! Run-scoped shared context.
//!
//! Every agent that finishes commits one [`ContextEntry`] holding its full
//! output and a summary. Later agents receive the context in one of two ways:
//!
//! - **push**: [`SharedContext::render`] produces a document in which the
//!   immediately preceding step is shown in full and everything earlier only
//!   as a summary. Inside a branch sub-chain the preceding step is the
//!   branch's own predecessor; after a group it is the last agent of every
//!   branch.
//! - **pull**: [`SharedContext::hint`] lists what exists; the agent fetches
//!   detail on demand through the context tools
//!
//! The engine owns the context and is the only writer. Runners and tools see
//! an immutable snapshot.

use regex::Regex;
use serde::Serialize;

const SUMMARY_LINE_MAX_CHARS: usize = 200;

/// One agent's committed output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextEntry {
    pub agent: String,
    pub full: String,
    /// Never empty while `full` is non-empty.
    pub summary: String,
    /// Top-level flow step that produced this entry.
    pub step: usize,
}

impl ContextEntry {
    pub fn new(agent: impl Into<String>, full: impl Into<String>) -> Self {
        let full = full.into();
        Self {
            agent: agent.into(),
            summary: full.clone(),
            full,
            step: 0,
        }
    }

    /// Set the summary; an empty summary keeps the full text.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        let summary = summary.into();
        if !summary.trim().is_empty() {
            self.summary = summary;
        }
        self
    }

    pub fn at_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    pub fn char_count(&self) -> usize {
        self.full.chars().count()
    }

    /// First non-empty line of the summary, shortened for listings.
    pub fn summary_line(&self) -> String {
        let line = self
            .summary
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("");
        if line.chars().count() > SUMMARY_LINE_MAX_CHARS {
            let cut: String = line.chars().take(SUMMARY_LINE_MAX_CHARS).collect();
            format!("{}...", cut)
        } else {
            line.to_string()
        }
    }
}

/// A regex match inside one agent's full output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub agent: String,
    /// 1-based line number of the matching line.
    pub line: usize,
    /// The matching line with one line of surrounding text on each side.
    pub excerpt: String,
}

/// Insertion-ordered store of agent outputs for a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SharedContext {
    entries: Vec<ContextEntry>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an agent's entry. A replaced entry keeps its position.
    pub fn set(&mut self, entry: ContextEntry) {
        match self.entries.iter_mut().find(|e| e.agent == entry.agent) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Full text of an agent's output.
    pub fn get(&self, agent: &str) -> Option<&str> {
        self.entry(agent).map(|e| e.full.as_str())
    }

    pub fn entry(&self, agent: &str) -> Option<&ContextEntry> {
        self.entries.iter().find(|e| e.agent == agent)
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.agent.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry is shown in full. `recent` names the agents of the
    /// step immediately preceding the reader along its own chain.
    pub fn is_recent(entry: &ContextEntry, recent: &[String]) -> bool {
        recent.iter().any(|name| *name == entry.agent)
    }

    /// True when rendering for `recent` would summarize at least one entry.
    pub fn has_summarized(&self, recent: &[String]) -> bool {
        self.entries.iter().any(|e| !Self::is_recent(e, recent))
    }

    /// Tiered push-mode document: entries from the preceding step in full,
    /// everything earlier as its summary.
    pub fn render(&self, recent: &[String]) -> String {
        self.entries
            .iter()
            .map(|e| {
                if Self::is_recent(e, recent) {
                    format!("## {}\n{}", e.agent, e.full)
                } else {
                    format!("## {} (summary)\n{}", e.agent, e.summary)
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// One line per entry: name, size, and summary.
    pub fn listing(&self) -> String {
        if self.entries.is_empty() {
            return "No agent outputs available yet.".to_string();
        }
        self.entries
            .iter()
            .map(|e| format!("- **{}** ({} chars): {}", e.agent, e.char_count(), e.summary_line()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Pull-mode prompt hint. Empty when there is nothing to pull.
    pub fn hint(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        format!(
            "Outputs from earlier agents are available but not included here. \
             Use `list_context` to see them, `get_context` to read one in full, \
             and `search_context` to find specific details.\n\n{}",
            self.listing()
        )
    }

    /// Search every full output for `pattern`.
    ///
    /// The pattern is a regular expression; if it does not compile it is
    /// matched literally instead.
    pub fn search(&self, pattern: &str) -> Vec<SearchHit> {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(_) => match Regex::new(&regex::escape(pattern)) {
                Ok(re) => re,
                Err(_) => return vec![],
            },
        };

        let mut hits = Vec::new();
        for entry in &self.entries {
            let lines: Vec<&str> = entry.full.lines().collect();
            for (i, line) in lines.iter().enumerate() {
                if !re.is_match(line) {
                    continue;
                }
                let start = i.saturating_sub(1);
                let end = (i + 2).min(lines.len());
                hits.push(SearchHit {
                    agent: entry.agent.clone(),
                    line: i + 1,
                    excerpt: lines[start..end].join("\n"),
                });
            }
        }
        hits
    }
}
