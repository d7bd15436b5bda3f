//! Lookup of numbers in a previously collected institution dataset.

use super::phone::{is_blank, normalize};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub sido: String,
    pub gugun: String,
    pub name: String,
    pub phone: String,
    pub fax: String,
}

impl ReferenceEntry {
    fn full_name(&self) -> String {
        [self.sido.as_str(), self.gugun.as_str(), self.name.as_str()]
            .iter()
            .filter(|s| !s.trim().is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactKind {
    Phone,
    Fax,
}

impl ContactKind {
    pub fn label(self) -> &'static str {
        match self {
            ContactKind::Phone => "전화",
            ContactKind::Fax => "팩스",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceMatch {
    pub name: String,
    /// What the number was looked up as.
    pub queried_as: ContactKind,
    /// What the dataset says the number is.
    pub found_as: ContactKind,
    pub label: String,
}

impl ReferenceMatch {
    pub fn match_type(&self) -> String {
        format!("{}→{}", self.queried_as.label(), self.found_as.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceOutcome {
    pub phone: Option<ReferenceMatch>,
    pub fax: Option<ReferenceMatch>,
}

impl ReferenceOutcome {
    pub fn matched(&self) -> bool {
        self.phone.is_some() || self.fax.is_some()
    }

    /// 100 when both numbers match, 80 when one does.
    pub fn confidence(&self) -> f32 {
        match (&self.phone, &self.fax) {
            (Some(_), Some(_)) => 100.0,
            (Some(_), None) | (None, Some(_)) => 80.0,
            (None, None) => 0.0,
        }
    }

    pub fn label(&self) -> String {
        self.phone
            .iter()
            .chain(self.fax.iter())
            .map(|m| m.label.clone())
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    by_phone: HashMap<String, ReferenceEntry>,
    by_fax: HashMap<String, ReferenceEntry>,
}

impl ReferenceIndex {
    pub fn new(entries: impl IntoIterator<Item = ReferenceEntry>) -> Self {
        let mut index = Self::default();
        for entry in entries {
            if !is_blank(&entry.phone) {
                index.by_phone.insert(normalize(&entry.phone), entry.clone());
            }
            if !is_blank(&entry.fax) {
                index.by_fax.insert(normalize(&entry.fax), entry);
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.by_phone.len() + self.by_fax.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look `number` up as `kind`, trying the same column first and the other
    /// column second.
    pub fn find(&self, number: &str, kind: ContactKind) -> Option<ReferenceMatch> {
        if is_blank(number) {
            return None;
        }
        let key = normalize(number);
        let order = match kind {
            ContactKind::Phone => [(ContactKind::Phone, &self.by_phone), (ContactKind::Fax, &self.by_fax)],
            ContactKind::Fax => [(ContactKind::Fax, &self.by_fax), (ContactKind::Phone, &self.by_phone)],
        };
        order.iter().find_map(|(found_as, map)| {
            map.get(&key).map(|entry| ReferenceMatch {
                name: entry.name.clone(),
                queried_as: kind,
                found_as: *found_as,
                label: format!("{}은 {}의 {}번호입니다", key, entry.full_name(), found_as.label()),
            })
        })
    }

    pub fn lookup(&self, phone: &str, fax: &str) -> ReferenceOutcome {
        ReferenceOutcome {
            phone: self.find(phone, ContactKind::Phone),
            fax: self.find(fax, ContactKind::Fax),
        }
    }
}
