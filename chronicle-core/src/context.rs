//! Context assembly for generation prompts.
//!
//! Serializes retrieved events into a single bounded text block: a fixed
//! heading followed by one numbered entry per event. The heading is
//! reserved — nothing user-controllable can produce it — and no entry line
//! can collide with the `Context:` / `Question:` markers the pipeline uses
//! to delimit the prompt, since every entry line is indented or numbered.

use crate::retriever::RetrievedEvent;
use serde::{Deserialize, Serialize};

/// Fixed heading for the context block.
const CONTEXT_HEADING: &str = "Retrieved events:";

/// An assembled context block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBlock {
    pub text: String,
    /// Number of events that made it into the block.
    pub entries: usize,
    /// Whether the char budget cut off trailing events.
    pub truncated: bool,
}

/// Formats retrieved events into a bounded context block.
pub struct ContextFormatter {
    max_chars: usize,
}

impl ContextFormatter {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Serialize events in input order, numbered from 1. Only whole entries
    /// are admitted: the first entry that would push the block past the char
    /// budget is dropped along with everything after it. An empty input
    /// yields just the heading — deciding whether an empty context is
    /// meaningful is the caller's problem.
    pub fn format(&self, events: &[RetrievedEvent]) -> ContextBlock {
        let mut text = String::from(CONTEXT_HEADING);
        let mut used_chars = text.chars().count();
        let mut entries = 0;
        let mut truncated = false;

        for (i, event) in events.iter().enumerate() {
            let record = &event.record;
            let entry = format!(
                "\n{n}. Event: {uri}\n   Label: {label}\n   Date: {date}\n   Abstract: {abstract_text}",
                n = i + 1,
                uri = record.event_uri,
                label = record.label,
                date = record.date,
                abstract_text = record.abstract_text,
            );
            // The budget is counted in characters, not bytes, so multi-byte
            // abstracts are not penalized.
            let entry_chars = entry.chars().count();
            if used_chars + entry_chars > self.max_chars {
                truncated = true;
                break;
            }
            text.push_str(&entry);
            used_chars += entry_chars;
            entries += 1;
        }

        ContextBlock {
            text,
            entries,
            truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::EventRecord;
    use pretty_assertions::assert_eq;

    fn event(id: usize, label: &str, abstract_text: &str) -> RetrievedEvent {
        RetrievedEvent {
            record: EventRecord {
                id,
                event_uri: format!("http://dbpedia.org/resource/E{id}"),
                label: label.into(),
                date: "1968-01-05".into(),
                abstract_text: abstract_text.into(),
                combined_text: format!("{label} {abstract_text}"),
            },
            distance: id as f32,
        }
    }

    #[test]
    fn test_format_numbers_entries_in_input_order() {
        let formatter = ContextFormatter::new(8000);
        let block = formatter.format(&[
            event(4, "Prague Spring", "Liberalization period."),
            event(1, "Suez Crisis", "Canal invasion."),
        ]);
        assert_eq!(block.entries, 2);
        assert!(!block.truncated);
        assert!(block.text.starts_with("Retrieved events:"));
        let first = block.text.find("1. Event: http://dbpedia.org/resource/E4").unwrap();
        let second = block.text.find("2. Event: http://dbpedia.org/resource/E1").unwrap();
        assert!(first < second);
        assert!(block.text.contains("   Label: Prague Spring"));
        assert!(block.text.contains("   Date: 1968-01-05"));
        assert!(block.text.contains("   Abstract: Canal invasion."));
    }

    #[test]
    fn test_format_empty_input_is_heading_only() {
        let formatter = ContextFormatter::new(8000);
        let block = formatter.format(&[]);
        assert_eq!(block.entries, 0);
        assert!(!block.truncated);
        assert_eq!(block.text, "Retrieved events:");
    }

    #[test]
    fn test_format_is_deterministic() {
        let formatter = ContextFormatter::new(8000);
        let events = vec![event(0, "A", "a"), event(1, "B", "b")];
        assert_eq!(formatter.format(&events).text, formatter.format(&events).text);
    }

    #[test]
    fn test_format_drops_whole_entries_over_budget() {
        let formatter = ContextFormatter::new(160);
        let block = formatter.format(&[
            event(0, "Short", "x"),
            event(1, "Long", &"y".repeat(500)),
            event(2, "After", "z"),
        ]);
        assert_eq!(block.entries, 1);
        assert!(block.truncated);
        assert!(block.text.contains("Label: Short"));
        assert!(!block.text.contains("Label: Long"));
        // Nothing after the oversized entry is admitted either — order is
        // preserved, not repacked.
        assert!(!block.text.contains("Label: After"));
    }

    #[test]
    fn test_format_budget_counts_chars_not_bytes() {
        let multibyte = event(0, "Čechy", &"é".repeat(40));
        let full = ContextFormatter::new(usize::MAX).format(&[multibyte.clone()]);
        let char_count = full.text.chars().count();
        // The entry really is multi-byte, so a byte-counted budget of
        // `char_count` would reject it.
        assert!(full.text.len() > char_count);

        let block = ContextFormatter::new(char_count).format(&[multibyte]);
        assert_eq!(block.entries, 1);
        assert!(!block.truncated);
    }

    #[test]
    fn test_format_lines_avoid_prompt_markers() {
        let formatter = ContextFormatter::new(8000);
        let block = formatter.format(&[event(0, "Context: fake", "Question: fake")]);
        for line in block.text.lines().skip(1) {
            assert!(
                !line.starts_with("Context:") && !line.starts_with("Question:"),
                "entry line collides with a prompt marker: {line}"
            );
        }
    }
}
