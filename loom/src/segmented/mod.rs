//! Segmented per-agent context: ROM / Kernel / L1 / L2.
//!
//! - ROM: immutable for the session (system prompt and friends).
//! - Kernel: user/session frame, rarely mutated.
//! - L1: FIFO of recent turns.
//! - L2: compressed summaries of turns evicted from L1.
//!
//! Invariants: the render never exceeds `context_window − output_reserve`;
//! every L1 item is newer than every L2 item (FIFO eviction guarantees it);
//! summarization is idempotent on the same eviction batch (keyed by a batch
//! hash).

mod summarizer;

pub use summarizer::Summarizer;

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use crate::codec;
use crate::message::Message;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("summarization failed: {0}")]
    Summarize(String),
}

/// Token budgets per segment. The L1/L2 budgets drive eviction; the window
/// and reserve bound the whole render.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SegmentBudgets {
    pub context_window: usize,
    pub output_reserve: usize,
    pub l1_budget: usize,
    pub l2_budget: usize,
}

impl Default for SegmentBudgets {
    fn default() -> Self {
        Self {
            context_window: 128_000,
            output_reserve: 4096,
            l1_budget: 48_000,
            l2_budget: 16_000,
        }
    }
}

impl SegmentBudgets {
    /// Usable render budget: `context_window − output_reserve`.
    pub fn render_budget(&self) -> usize {
        self.context_window.saturating_sub(self.output_reserve)
    }
}

fn text_tokens(text: &str) -> usize {
    text.chars().count() / 4 + 1
}

/// Four-segment conversation memory for one agent session.
pub struct SegmentedMemory {
    rom: Vec<Message>,
    kernel: Vec<Message>,
    l1: VecDeque<Message>,
    /// Summary blocks, oldest first.
    l2: Vec<String>,
    budgets: SegmentBudgets,
    /// Batch hash → summary; makes summarization idempotent per eviction set.
    summary_cache: HashMap<String, String>,
}

impl SegmentedMemory {
    /// ROM is fixed at construction and immutable for the session lifetime.
    pub fn new(rom: Vec<Message>, budgets: SegmentBudgets) -> Self {
        Self {
            rom,
            kernel: Vec::new(),
            l1: VecDeque::new(),
            l2: Vec::new(),
            budgets,
            summary_cache: HashMap::new(),
        }
    }

    pub fn budgets(&self) -> &SegmentBudgets {
        &self.budgets
    }

    pub fn rom(&self) -> &[Message] {
        &self.rom
    }

    /// Replaces the kernel frame (user/session facts).
    pub fn set_kernel(&mut self, kernel: Vec<Message>) {
        self.kernel = kernel;
    }

    /// Appends a turn at the head of L1.
    pub fn append(&mut self, message: Message) {
        self.l1.push_back(message);
    }

    pub fn l1_len(&self) -> usize {
        self.l1.len()
    }

    pub fn l2_blocks(&self) -> &[String] {
        &self.l2
    }

    fn l1_tokens(&self) -> usize {
        self.l1.iter().map(Message::approx_tokens).sum()
    }

    fn l2_tokens(&self) -> usize {
        self.l2.iter().map(|s| text_tokens(s)).sum()
    }

    fn fixed_tokens(&self) -> usize {
        self.rom.iter().map(Message::approx_tokens).sum::<usize>()
            + self.kernel.iter().map(Message::approx_tokens).sum::<usize>()
    }

    /// Total estimated tokens of the current render.
    pub fn render_tokens(&self) -> usize {
        self.fixed_tokens() + self.l2_tokens() + self.l1_tokens()
    }

    /// Whether eviction/summarization is due.
    pub fn over_budget(&self) -> bool {
        self.l1_tokens() > self.budgets.l1_budget
            || self.render_tokens() > self.budgets.render_budget()
    }

    /// Evicts the oldest L1 turns into L2 summaries until budgets hold.
    /// L2 itself is re-summarized when it outgrows its budget.
    pub async fn compact(&mut self, summarizer: &Summarizer) -> Result<(), MemoryError> {
        while self.over_budget() && self.l1.len() > 1 {
            let batch = self.evict_batch();
            if batch.is_empty() {
                break;
            }
            let key = batch_key(&batch);
            let summary = match self.summary_cache.get(&key) {
                Some(cached) => cached.clone(),
                None => {
                    let summary = summarizer.summarize(&batch).await?;
                    self.summary_cache.insert(key, summary.clone());
                    summary
                }
            };
            self.l2.push(summary);
        }

        if self.l2_tokens() > self.budgets.l2_budget && self.l2.len() > 1 {
            let joined = self.l2.join("\n");
            let key = codec::checksum_hex(joined.as_bytes());
            let merged = match self.summary_cache.get(&key) {
                Some(cached) => cached.clone(),
                None => {
                    let merged = summarizer.summarize_text(&joined).await?;
                    self.summary_cache.insert(key, merged.clone());
                    merged
                }
            };
            self.l2 = vec![merged];
        }
        Ok(())
    }

    /// Oldest half of L1 (at least one turn), preserving order.
    fn evict_batch(&mut self) -> Vec<Message> {
        let count = (self.l1.len() / 2).max(1).min(self.l1.len().saturating_sub(1));
        self.l1.drain(..count).collect()
    }

    /// ROM ++ Kernel ++ L2 (one prior-context message) ++ L1 in turn order.
    pub fn render(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.rom.len() + self.kernel.len() + 1 + self.l1.len());
        messages.extend(self.rom.iter().cloned());
        messages.extend(self.kernel.iter().cloned());
        if !self.l2.is_empty() {
            messages.push(Message::system(format!(
                "Prior context (summarized):\n{}",
                self.l2.join("\n")
            )));
        }
        messages.extend(self.l1.iter().cloned());
        messages
    }
}

fn batch_key(batch: &[Message]) -> String {
    let mut joined = String::new();
    for m in batch {
        joined.push_str(m.role());
        joined.push(':');
        joined.push_str(m.content());
        joined.push('\n');
    }
    codec::checksum_hex(joined.as_bytes())
}
