//! Concatenation of several event readers into one logical stream.

use crate::error::XmlStreamError;
use crate::event::XmlEvent;
use crate::reader::EventReader;

/// [`EventReader`] that reads its sources one after another.
///
/// The end-of-document event of every source but the last is swallowed, so a
/// consumer sees a single document. The cursor only moves forward.
///
/// Peeking across a source boundary advances the cursor past the exhausted
/// source even though no event is consumed.
pub struct CompositeEventReader<'a> {
    readers: Vec<Box<dyn EventReader + Send + 'a>>,
    cursor: usize,
}

impl<'a> CompositeEventReader<'a> {
    /// # Panics
    ///
    /// Panics if `readers` is empty.
    pub fn new(readers: Vec<Box<dyn EventReader + Send + 'a>>) -> Self {
        assert!(!readers.is_empty(), "at least one event reader is required");
        Self { readers, cursor: 0 }
    }

    pub fn single(reader: impl EventReader + Send + 'a) -> Self {
        Self::new(vec![Box::new(reader)])
    }

    /// Index of the source currently read from.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn source_count(&self) -> usize {
        self.readers.len()
    }

    fn at_last_reader(&self) -> bool {
        self.cursor + 1 == self.readers.len()
    }
}

impl EventReader for CompositeEventReader<'_> {
    fn has_next(&mut self) -> bool {
        while self.cursor < self.readers.len() {
            if !self.at_last_reader() && !self.readers[self.cursor].has_next() {
                self.cursor += 1;
                continue;
            }
            return self.readers[self.cursor].has_next();
        }
        false
    }

    fn next_event(&mut self) -> Result<XmlEvent, XmlStreamError> {
        while self.cursor < self.readers.len() {
            let last = self.at_last_reader();
            if !last && !self.readers[self.cursor].has_next() {
                self.cursor += 1;
                continue;
            }
            let event = self.readers[self.cursor].next_event()?;
            if !last && event.is_end_document() {
                self.cursor += 1;
                continue;
            }
            return Ok(event);
        }
        Err(XmlStreamError::UnexpectedEnd)
    }

    fn peek(&mut self) -> Result<Option<&XmlEvent>, XmlStreamError> {
        while self.cursor < self.readers.len() {
            if self.at_last_reader() {
                break;
            }
            let boundary = match self.readers[self.cursor].peek()? {
                Some(event) => event.is_end_document(),
                None => true,
            };
            if !boundary {
                break;
            }
            self.cursor += 1;
        }
        match self.readers.get_mut(self.cursor) {
            Some(reader) => reader.peek(),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::QName;
    use crate::reader::{collect_events, BufferedEventReader, QuickXmlEventReader};

    fn chars(text: &str) -> XmlEvent {
        XmlEvent::characters(text)
    }

    fn source(events: Vec<XmlEvent>) -> Box<dyn EventReader + Send> {
        Box::new(BufferedEventReader::new(events))
    }

    /// Reader whose every call fails.
    struct FailingReader;

    impl EventReader for FailingReader {
        fn has_next(&mut self) -> bool {
            true
        }

        fn next_event(&mut self) -> Result<XmlEvent, XmlStreamError> {
            Err(XmlStreamError::Malformed("broken source".to_string()))
        }

        fn peek(&mut self) -> Result<Option<&XmlEvent>, XmlStreamError> {
            Err(XmlStreamError::Malformed("broken source".to_string()))
        }
    }

    #[test]
    fn test_concatenation_keeps_only_last_end_document() {
        let mut reader = CompositeEventReader::new(vec![
            source(vec![chars("a"), chars("b"), XmlEvent::EndDocument]),
            source(vec![chars("c"), XmlEvent::EndDocument]),
        ]);
        let events = collect_events(&mut reader).unwrap();
        assert_eq!(
            events,
            vec![chars("a"), chars("b"), chars("c"), XmlEvent::EndDocument]
        );
        assert!(!reader.has_next());
    }

    #[test]
    fn test_single_source() {
        let mut reader = CompositeEventReader::single(BufferedEventReader::fragment(vec![chars("x")]));
        assert_eq!(collect_events(&mut reader).unwrap(), vec![chars("x"), XmlEvent::EndDocument]);
    }

    #[test]
    fn test_exhausted_sources_are_skipped() {
        let mut reader = CompositeEventReader::new(vec![
            source(vec![]),
            source(vec![chars("a"), XmlEvent::EndDocument]),
            source(vec![]),
            source(vec![chars("b"), XmlEvent::EndDocument]),
        ]);
        let events = collect_events(&mut reader).unwrap();
        assert_eq!(events, vec![chars("a"), chars("b"), XmlEvent::EndDocument]);
        assert_eq!(reader.cursor(), 3);
    }

    #[test]
    fn test_has_next_advances_past_exhausted_sources() {
        let mut reader = CompositeEventReader::new(vec![
            source(vec![]),
            source(vec![chars("a")]),
        ]);
        assert!(reader.has_next());
        assert_eq!(reader.cursor(), 1);
    }

    #[test]
    fn test_peek_across_boundary_advances_cursor() {
        let mut reader = CompositeEventReader::new(vec![
            source(vec![chars("a"), XmlEvent::EndDocument]),
            source(vec![chars("b"), XmlEvent::EndDocument]),
        ]);
        assert_eq!(reader.next_event().unwrap(), chars("a"));
        assert_eq!(reader.cursor(), 0);

        assert_eq!(reader.peek().unwrap(), Some(&chars("b")));
        assert_eq!(reader.cursor(), 1);
        // nothing was consumed by the peek
        assert_eq!(reader.peek().unwrap(), Some(&chars("b")));
        assert_eq!(reader.next_event().unwrap(), chars("b"));
        assert_eq!(reader.next_event().unwrap(), XmlEvent::EndDocument);
        assert_eq!(reader.peek().unwrap(), None);
    }

    #[test]
    fn test_peek_within_source_keeps_cursor() {
        let mut reader = CompositeEventReader::new(vec![
            source(vec![chars("a"), XmlEvent::EndDocument]),
            source(vec![XmlEvent::EndDocument]),
        ]);
        assert_eq!(reader.peek().unwrap(), Some(&chars("a")));
        assert_eq!(reader.cursor(), 0);
    }

    #[test]
    fn test_parsed_documents_join() {
        let mut reader = CompositeEventReader::new(vec![
            Box::new(QuickXmlEventReader::new("<a/>".as_bytes())),
            Box::new(QuickXmlEventReader::new("<b/>".as_bytes())),
        ]);
        let events = collect_events(&mut reader).unwrap();
        let ends = events.iter().filter(|e| e.is_end_document()).count();
        assert_eq!(ends, 1);
        assert!(events.contains(&XmlEvent::end(QName::local("a"))));
        assert!(events.last().unwrap().is_end_document());
    }

    #[test]
    fn test_source_failure_propagates_unchanged() {
        let mut reader = CompositeEventReader::new(vec![
            source(vec![chars("a"), XmlEvent::EndDocument]),
            Box::new(FailingReader),
        ]);
        reader.next_event().unwrap();
        match reader.next_event() {
            Err(XmlStreamError::Malformed(message)) => assert_eq!(message, "broken source"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    #[should_panic(expected = "at least one event reader")]
    fn test_empty_composite_panics() {
        let _ = CompositeEventReader::new(Vec::new());
    }
}
