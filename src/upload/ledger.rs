//! Part Ledger
//!
//! Records the parts a session has received. Entries are keyed by part number,
//! so a re-uploaded part replaces the earlier ETag, and iteration is always in
//! ascending part order regardless of arrival order.

use std::collections::BTreeMap;

use crate::storage::PartInfo;

#[derive(Debug, Default, Clone)]
pub struct PartLedger {
    parts: BTreeMap<u32, String>,
}

impl PartLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a part, returning the ETag it replaced, if any
    pub fn add_part(&mut self, part_number: u32, etag: String) -> Option<String> {
        self.parts.insert(part_number, etag)
    }

    /// Number of distinct parts received
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn is_complete(&self, expected_parts: u32) -> bool {
        self.parts.len() == expected_parts as usize
    }

    /// Parts sorted ascending by part number
    pub fn ordered_parts(&self) -> Vec<PartInfo> {
        self.parts
            .iter()
            .map(|(part_number, etag)| PartInfo {
                part_number: *part_number,
                etag: etag.clone(),
            })
            .collect()
    }

    /// Part numbers in `1..=expected_parts` not yet received
    pub fn missing_parts(&self, expected_parts: u32) -> Vec<u32> {
        (1..=expected_parts)
            .filter(|n| !self.parts.contains_key(n))
            .collect()
    }
}
