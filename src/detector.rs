//! Change detection against the fingerprint store.

use std::fmt;

use crate::app::Result;
use crate::domain::Record;
use crate::store::FingerprintStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    New,
    Changed,
    Unchanged,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::New => write!(f, "new"),
            Change::Changed => write!(f, "changed"),
            Change::Unchanged => write!(f, "unchanged"),
        }
    }
}

pub struct ChangeDetector<S> {
    store: S,
}

impl<S: FingerprintStore> ChangeDetector<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Compare the record's fingerprint with the last committed one.
    pub fn classify(&self, record: &Record) -> Result<Change> {
        Ok(match self.store.get(&record.identity)? {
            None => Change::New,
            Some(known) if known == record.fingerprint => Change::Unchanged,
            Some(_) => Change::Changed,
        })
    }

    /// Record the fingerprint. Call only after the write (and sync, when
    /// enabled) succeeded.
    pub fn commit(&self, record: &Record) -> Result<()> {
        self.store.put(&record.identity, &record.fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldValue, Fields};
    use crate::store::JsonFileStore;

    fn record(identity: &str, name: &str) -> Record {
        let mut fields = Fields::new();
        fields.insert("name".into(), FieldValue::Text(name.into()));
        Record::new(identity.into(), format!("https://x/{}", identity), fields).unwrap()
    }

    #[test]
    fn test_new_then_unchanged() {
        let detector = ChangeDetector::new(JsonFileStore::in_memory());
        let a = record("A", "Ann");

        assert_eq!(detector.classify(&a).unwrap(), Change::New);
        detector.commit(&a).unwrap();
        assert_eq!(detector.classify(&record("A", "Ann")).unwrap(), Change::Unchanged);
    }

    #[test]
    fn test_changed_until_committed() {
        let detector = ChangeDetector::new(JsonFileStore::in_memory());
        detector.commit(&record("A", "Ann")).unwrap();

        let edited = record("A", "Anne");
        assert_eq!(detector.classify(&edited).unwrap(), Change::Changed);
        // no commit: still changed next time
        assert_eq!(detector.classify(&edited).unwrap(), Change::Changed);

        detector.commit(&edited).unwrap();
        assert_eq!(detector.classify(&edited).unwrap(), Change::Unchanged);
        assert_eq!(
            detector.store().get("A").unwrap(),
            Some(edited.fingerprint.clone())
        );
    }

    #[test]
    fn test_last_seen_does_not_affect_classification() {
        let detector = ChangeDetector::new(JsonFileStore::in_memory());
        let first = record("A", "Ann");
        detector.commit(&first).unwrap();

        let mut later = record("A", "Ann");
        later.last_seen = first.last_seen + chrono::Duration::days(3);
        assert_eq!(detector.classify(&later).unwrap(), Change::Unchanged);
    }
}
