use std::collections::HashMap;

/// Storage identifiers for one persisted set row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetRef {
    pub set_id: u64,
    pub product_line_id: u64,
}

/// Read-only snapshot mapping a set's display name to its storage ids.
///
/// Built once per run after the set write phase has fully completed, and
/// never mutated afterwards, so it is shared across write workers behind an
/// `Arc` with no locking. Set names are unique within a product line, so
/// the map is lossless.
#[derive(Debug, Default)]
pub struct SetIndex {
    by_name: HashMap<String, SetRef>,
}

impl SetIndex {
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, SetRef)>,
    {
        Self {
            by_name: rows.into_iter().collect(),
        }
    }

    pub fn get(&self, set_name: &str) -> Option<SetRef> {
        self.by_name.get(set_name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
