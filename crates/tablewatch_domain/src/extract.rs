use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::browse::Observation;
use crate::payload::{NodeId, PayloadNode, PayloadTree};
use crate::time::{date_representations, parse_time, TimeOfDay};

const DATE_KEY_TOKENS: &[&str] = &["date", "day", "bookingdate", "reservationdate", "selecteddate"];
const TIME_KEY_TOKENS: &[&str] = &[
    "time",
    "starttime",
    "start_time",
    "slot",
    "availability",
    "reservationtime",
];

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}:\d{2}").expect("time pattern compiles"));
static ISO_DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T(\d{2}):(\d{2}):").expect("datetime pattern compiles")
});
static TEXT_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\d{1,2}:\d{2}(?::\d{2})?(?:\s*[ap]\.?m\b)?").expect("text pattern compiles")
});

/// A time found in a payload, before window filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSlot {
    pub raw: String,
    pub time: TimeOfDay,
    pub date_confirmed: bool,
}

/// Candidate slots keyed by their normalised time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    slots: BTreeMap<TimeOfDay, CandidateSlot>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the first raw string seen for a time; confirmation is sticky.
    pub fn insert(&mut self, slot: CandidateSlot) {
        self.slots
            .entry(slot.time)
            .and_modify(|existing| existing.date_confirmed |= slot.date_confirmed)
            .or_insert(slot);
    }

    pub fn merge(&mut self, other: CandidateSet) {
        for slot in other.slots.into_values() {
            self.insert(slot);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, time: TimeOfDay) -> Option<&CandidateSlot> {
        self.slots.get(&time)
    }

    /// All slots in ascending time order.
    pub fn iter(&self) -> impl Iterator<Item = &CandidateSlot> {
        self.slots.values()
    }

    /// Slots whose surrounding structure referenced the target date.
    pub fn confirmed(&self) -> impl Iterator<Item = &CandidateSlot> {
        self.slots.values().filter(|slot| slot.date_confirmed)
    }
}

/// Recovers reservation times from heterogeneous payloads.
#[derive(Debug, Clone)]
pub struct TimeExtractor {
    target_date: NaiveDate,
    date_forms: [String; 3],
    trust_dated_text: bool,
}

impl TimeExtractor {
    pub fn new(target_date: NaiveDate) -> Self {
        Self {
            target_date,
            date_forms: date_representations(target_date),
            trust_dated_text: false,
        }
    }

    /// Treat flat page text that mentions the target date as date-confirmed.
    pub fn trust_dated_text(mut self, trust: bool) -> Self {
        self.trust_dated_text = trust;
        self
    }

    pub fn target_date(&self) -> NaiveDate {
        self.target_date
    }

    pub fn extract(&self, observation: &Observation) -> CandidateSet {
        match observation {
            Observation::Json { tree, .. } => self.extract_tree(tree),
            Observation::Text(text) => self.extract_text(text),
        }
    }

    pub fn extract_tree(&self, tree: &PayloadTree) -> CandidateSet {
        let mut found = CandidateSet::new();
        let Some(root) = tree.root() else {
            return found;
        };

        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<(NodeId, bool)> = vec![(root, false)];
        while let Some((id, confirmed)) = stack.pop() {
            match tree.node(id) {
                PayloadNode::Text(text) => self.scan_leaf(text, confirmed, &mut found),
                PayloadNode::Map(entries) => {
                    if !visited.insert(id) {
                        continue;
                    }
                    let confirmed = confirmed || self.entries_mention_date(tree, entries);
                    for (key, child) in entries {
                        if !key_matches(key, TIME_KEY_TOKENS) {
                            continue;
                        }
                        if let PayloadNode::Text(text) = tree.node(*child) {
                            if TIME_RE.is_match(text) {
                                push_parsed(text, confirmed, &mut found);
                            }
                        }
                    }
                    stack.extend(entries.iter().rev().map(|(_, child)| (*child, confirmed)));
                }
                PayloadNode::List(items) => {
                    if !visited.insert(id) {
                        continue;
                    }
                    stack.extend(items.iter().rev().map(|child| (*child, confirmed)));
                }
                PayloadNode::Null | PayloadNode::Bool(_) | PayloadNode::Number(_) => {}
            }
        }
        found
    }

    /// Every clock time in rendered page text. Text carries no structure, so
    /// its slots are only confirmed when trusted and the date appears in it.
    pub fn extract_text(&self, text: &str) -> CandidateSet {
        let mut found = CandidateSet::new();
        let confirmed = self.trust_dated_text && self.mentions_date(text);
        for m in TEXT_TIME_RE.find_iter(text) {
            // "p.m." reads as "PM"
            let raw = m.as_str();
            if let Ok(time) = parse_time(&raw.replace('.', "")) {
                found.insert(CandidateSlot {
                    raw: raw.to_string(),
                    time,
                    date_confirmed: confirmed,
                });
            }
        }
        found
    }

    fn scan_leaf(&self, text: &str, confirmed: bool, found: &mut CandidateSet) {
        if let Some(caps) = ISO_DATETIME_RE.captures(text) {
            let hour = caps[1].parse::<u32>();
            let minute = caps[2].parse::<u32>();
            if let (Ok(hour), Ok(minute)) = (hour, minute) {
                if let Ok(time) = TimeOfDay::new(hour, minute) {
                    found.insert(CandidateSlot {
                        raw: text.to_string(),
                        time,
                        date_confirmed: confirmed,
                    });
                }
            }
        }
        if TIME_RE.is_match(text) {
            push_parsed(text, confirmed, found);
        }
    }

    fn entries_mention_date(&self, tree: &PayloadTree, entries: &[(String, NodeId)]) -> bool {
        entries.iter().any(|(key, child)| {
            key_matches(key, DATE_KEY_TOKENS)
                && tree
                    .flat_text(*child)
                    .is_some_and(|text| self.mentions_date(&text))
        })
    }

    fn mentions_date(&self, text: &str) -> bool {
        self.date_forms.iter().any(|form| text.contains(form.as_str()))
    }
}

fn key_matches(key: &str, tokens: &[&str]) -> bool {
    let lower = key.to_ascii_lowercase();
    tokens.iter().any(|token| lower.contains(token))
}

fn push_parsed(raw: &str, confirmed: bool, found: &mut CandidateSet) {
    if let Ok(time) = parse_time(raw) {
        found.insert(CandidateSlot {
            raw: raw.to_string(),
            time,
            date_confirmed: confirmed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn confirmed_times(set: &CandidateSet) -> Vec<String> {
        set.confirmed().map(|slot| slot.time.to_string()).collect()
    }

    fn all_times(set: &CandidateSet) -> Vec<String> {
        set.iter().map(|slot| slot.time.to_string()).collect()
    }

    #[test]
    fn confirms_times_under_matching_date() {
        let tree = PayloadTree::from_json(&json!({
            "date": "2024-03-15",
            "slots": [{"time": "19:30"}, {"time": "22:00"}]
        }));
        let set = TimeExtractor::new(target()).extract_tree(&tree);
        assert_eq!(confirmed_times(&set), vec!["19:30", "22:00"]);
    }

    #[test]
    fn unrelated_date_is_not_confirmed() {
        let tree = PayloadTree::from_json(&json!({
            "date": "2024-03-16",
            "slots": [{"time": "19:30"}]
        }));
        let set = TimeExtractor::new(target()).extract_tree(&tree);
        assert_eq!(all_times(&set), vec!["19:30"]);
        assert!(confirmed_times(&set).is_empty());
    }

    #[test]
    fn confirmation_stays_inside_its_branch() {
        let tree = PayloadTree::from_json(&json!({
            "days": [
                {"date": "2024-03-15", "times": ["18:30"]},
                {"date": "2024-03-16", "times": ["20:00"]}
            ]
        }));
        let set = TimeExtractor::new(target()).extract_tree(&tree);
        assert_eq!(confirmed_times(&set), vec!["18:30"]);
        assert!(!set.get("20:00".parse().unwrap()).unwrap().date_confirmed);
    }

    #[test]
    fn slash_date_forms_confirm() {
        let us = PayloadTree::from_json(&json!({"selectedDate": "3/15/2024", "slot": "7:00 PM"}));
        let eu = PayloadTree::from_json(&json!({"BookingDay": "15/3/2024", "startTime": "19:15"}));
        let extractor = TimeExtractor::new(target());
        assert_eq!(confirmed_times(&extractor.extract_tree(&us)), vec!["19:00"]);
        assert_eq!(confirmed_times(&extractor.extract_tree(&eu)), vec!["19:15"]);
    }

    #[test]
    fn flat_list_of_dates_confirms() {
        let tree = PayloadTree::from_json(&json!({
            "days": ["2024-03-14", "2024-03-15"],
            "availability": ["19:00"]
        }));
        let set = TimeExtractor::new(target()).extract_tree(&tree);
        assert_eq!(confirmed_times(&set), vec!["19:00"]);
    }

    #[test]
    fn normalizes_iso_meridiem_and_seconds() {
        let tree = PayloadTree::from_json(&json!({
            "reservationDate": "2024-03-15",
            "results": [
                {"dateTime": "2024-03-15T08:05:00"},
                {"label": "7:30 PM"},
                {"start_time": "19:45:00"}
            ]
        }));
        let set = TimeExtractor::new(target()).extract_tree(&tree);
        assert_eq!(confirmed_times(&set), vec!["08:05", "19:30", "19:45"]);
    }

    #[test]
    fn out_of_range_values_are_discarded() {
        let tree = PayloadTree::from_json(&json!({
            "date": "2024-03-15",
            "times": ["24:00", "19:60", "2024-03-15T25:10:00", "18:00"]
        }));
        let set = TimeExtractor::new(target()).extract_tree(&tree);
        assert_eq!(all_times(&set), vec!["18:00"]);
    }

    #[test]
    fn duplicates_collapse_and_confirmation_is_sticky() {
        let tree = PayloadTree::from_json(&json!([
            {"time": "19:30"},
            {"date": "2024-03-15", "time": "7:30 pm"},
            "19:30:00"
        ]));
        let set = TimeExtractor::new(target()).extract_tree(&tree);
        assert_eq!(set.len(), 1);
        let slot = set.get("19:30".parse().unwrap()).unwrap();
        assert!(slot.date_confirmed);
        assert_eq!(slot.raw, "19:30");
    }

    #[test]
    fn empty_and_patternless_inputs_yield_nothing() {
        let extractor = TimeExtractor::new(target());
        assert!(extractor.extract_tree(&PayloadTree::new()).is_empty());
        assert!(extractor
            .extract_tree(&PayloadTree::from_json(&serde_json::Value::Null))
            .is_empty());
        let tree = PayloadTree::from_json(&json!({"date": "2024-03-15", "note": "call us", "n": 7}));
        assert!(extractor.extract_tree(&tree).is_empty());
        assert!(extractor.extract_text("").is_empty());
    }

    #[test]
    fn cyclic_tree_terminates() {
        let mut tree = PayloadTree::new();
        let root = tree.push(PayloadNode::Map(Vec::new()));
        let date = tree.push(PayloadNode::Text("2024-03-15".into()));
        let list = tree.push(PayloadNode::List(Vec::new()));
        let slot = tree.push(PayloadNode::Map(Vec::new()));
        let time = tree.push(PayloadNode::Text("20:15".into()));
        tree.insert_entry(root, "date", date);
        tree.insert_entry(root, "slots", list);
        tree.push_item(list, slot);
        tree.push_item(list, root);
        tree.insert_entry(slot, "time", time);
        tree.insert_entry(slot, "parent", root);
        tree.insert_entry(slot, "self", slot);
        tree.set_root(root);

        let set = TimeExtractor::new(target()).extract_tree(&tree);
        assert_eq!(confirmed_times(&set), vec!["20:15"]);
    }

    #[test]
    fn dotted_meridiem_in_page_text() {
        let set = TimeExtractor::new(target())
            .trust_dated_text(true)
            .extract_text("3/15/2024 7:30 p.m. or 12:30 a.m. or 12:15 P.M.");
        assert_eq!(confirmed_times(&set), vec!["00:30", "12:15", "19:30"]);
        assert_eq!(set.get("19:30".parse().unwrap()).unwrap().raw, "7:30 p.m");
    }

    #[test]
    fn page_text_is_unconfirmed_unless_trusted() {
        let text = "Friday, 3/15/2024\nAvailable: 6:00 PM  7:30 PM  21:00";
        let plain = TimeExtractor::new(target()).extract_text(text);
        assert_eq!(all_times(&plain), vec!["18:00", "19:30", "21:00"]);
        assert_eq!(plain.confirmed().count(), 0);

        let trusted = TimeExtractor::new(target())
            .trust_dated_text(true)
            .extract_text(text);
        assert_eq!(confirmed_times(&trusted), vec!["18:00", "19:30", "21:00"]);

        let other_day = TimeExtractor::new(target())
            .trust_dated_text(true)
            .extract_text("3/16/2024 6:00 PM");
        assert_eq!(other_day.confirmed().count(), 0);
    }
}
