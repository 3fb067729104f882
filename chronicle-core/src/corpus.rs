//! The corpus of historical event records.
//!
//! Records are loaded once, assigned positional ids, and never mutated or
//! reordered afterwards — the vector index aligns with the corpus purely by
//! position.

use crate::error::CorpusError;
use serde::{Deserialize, Serialize};

/// A raw corpus row as produced by the acquisition step (out of scope here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    /// URI identifying the event (e.g., a DBpedia resource).
    #[serde(alias = "event")]
    pub event_uri: String,
    pub label: String,
    pub date: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

/// A loaded, immutable event record with positional identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the corpus; matches the record's slot in the vector index.
    pub id: usize,
    pub event_uri: String,
    pub label: String,
    pub date: String,
    pub abstract_text: String,
    /// `label + " " + abstract`, computed once at load. This is the text
    /// that gets embedded.
    pub combined_text: String,
}

/// Ordered, read-only collection of event records.
#[derive(Debug, Clone)]
pub struct Corpus {
    records: Vec<EventRecord>,
}

impl Corpus {
    /// Load a corpus from raw rows, assigning positional ids `0..n-1` and
    /// computing `combined_text` per record.
    pub fn load(rows: Vec<EventRow>) -> Result<Self, CorpusError> {
        if rows.is_empty() {
            return Err(CorpusError::Empty);
        }

        let records = rows
            .into_iter()
            .enumerate()
            .map(|(id, row)| {
                let combined_text = format!("{} {}", row.label, row.abstract_text);
                EventRecord {
                    id,
                    event_uri: row.event_uri,
                    label: row.label,
                    date: row.date,
                    abstract_text: row.abstract_text,
                    combined_text,
                }
            })
            .collect();

        Ok(Self { records })
    }

    /// Get the record at `position`.
    pub fn get(&self, position: usize) -> Result<&EventRecord, CorpusError> {
        self.records.get(position).ok_or(CorpusError::OutOfRange {
            position,
            len: self.records.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_rows() -> Vec<EventRow> {
        vec![
            EventRow {
                event_uri: "http://dbpedia.org/resource/Velvet_Revolution".into(),
                label: "Velvet Revolution".into(),
                date: "1989-11-17".into(),
                abstract_text: "A non-violent transition of power in Czechoslovakia.".into(),
            },
            EventRow {
                event_uri: "http://dbpedia.org/resource/Prague_Spring".into(),
                label: "Prague Spring".into(),
                date: "1968-01-05".into(),
                abstract_text: "A period of political liberalization in Czechoslovakia.".into(),
            },
        ]
    }

    #[test]
    fn test_load_assigns_positional_ids() {
        let corpus = Corpus::load(sample_rows()).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.get(0).unwrap().id, 0);
        assert_eq!(corpus.get(1).unwrap().id, 1);
        assert_eq!(corpus.get(1).unwrap().label, "Prague Spring");
    }

    #[test]
    fn test_load_computes_combined_text() {
        let corpus = Corpus::load(sample_rows()).unwrap();
        assert_eq!(
            corpus.get(0).unwrap().combined_text,
            "Velvet Revolution A non-violent transition of power in Czechoslovakia."
        );
    }

    #[test]
    fn test_load_empty_rows_rejected() {
        let err = Corpus::load(Vec::new()).unwrap_err();
        assert_eq!(err, CorpusError::Empty);
    }

    #[test]
    fn test_get_out_of_range() {
        let corpus = Corpus::load(sample_rows()).unwrap();
        let err = corpus.get(2).unwrap_err();
        assert_eq!(
            err,
            CorpusError::OutOfRange {
                position: 2,
                len: 2
            }
        );
    }

    #[test]
    fn test_row_deserializes_abstract_field() {
        let row: EventRow = serde_json::from_str(
            r#"{"event_uri":"uri","label":"L","date":"1950-01-01","abstract":"A"}"#,
        )
        .unwrap();
        assert_eq!(row.abstract_text, "A");
    }

    #[test]
    fn test_row_accepts_event_alias() {
        // Rows scraped by the original acquisition step use "event" for the URI.
        let row: EventRow = serde_json::from_str(
            r#"{"event":"uri","label":"L","date":"1950-01-01","abstract":"A"}"#,
        )
        .unwrap();
        assert_eq!(row.event_uri, "uri");
    }
}
