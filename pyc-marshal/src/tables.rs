use crate::error::{MarshalError, RefTable, Result};
use crate::value::DecodedValue;

/// Back-reference state of one top-level decode call.
///
/// The two tables have independent index spaces: interned text is addressed
/// from 0, shared objects from 1 (index 0 never names an object). Create a
/// fresh `RefTables` for every independent stream.
#[derive(Clone, Debug, Default)]
pub struct RefTables {
    interned: Vec<String>,
    shared: Vec<DecodedValue>,
}

impl RefTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append interned text, returning the index an `R` tag will use for it.
    pub fn intern(&mut self, text: String) -> usize {
        self.interned.push(text);
        self.interned.len() - 1
    }

    /// Record a flagged value, returning the index an `r` tag will use for it.
    pub fn record(&mut self, value: DecodedValue) -> usize {
        self.shared.push(value);
        self.shared.len()
    }

    pub fn interned(&self, index: i64) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.interned.get(i))
            .map(String::as_str)
            .ok_or(MarshalError::BadBackReference {
                table: RefTable::Interned,
                index,
                len: self.interned.len(),
            })
    }

    pub fn shared(&self, index: i64) -> Result<&DecodedValue> {
        usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.shared.get(i))
            .ok_or(MarshalError::BadBackReference {
                table: RefTable::Shared,
                index,
                len: self.shared.len(),
            })
    }

    pub fn interned_len(&self) -> usize {
        self.interned.len()
    }

    pub fn shared_len(&self) -> usize {
        self.shared.len()
    }
}
