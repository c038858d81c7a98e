use serde::Serialize;

use crate::Condition;

/// Per-condition onset times, in presentation order.
///
/// Keys keep a stable order: configured conditions as configured, then
/// `REST`. Conditions that were never presented keep an empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OnsetIndex {
    entries: Vec<(Condition, Vec<f64>)>,
}

impl OnsetIndex {
    pub fn new<'a>(conditions: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = Self::default();
        for name in conditions {
            index.slot(&Condition::from(name));
        }
        index.slot(&Condition::Rest);
        index
    }

    pub fn push(&mut self, condition: &Condition, onset: f64) {
        self.slot(condition).push(onset);
    }

    pub fn get(&self, condition: &Condition) -> &[f64] {
        self.entries
            .iter()
            .find(|(c, _)| c == condition)
            .map(|(_, onsets)| onsets.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Condition, &[f64])> {
        self.entries.iter().map(|(c, o)| (c, o.as_slice()))
    }

    /// Conditions with at least one onset; the set that gets persisted.
    pub fn presented(&self) -> impl Iterator<Item = (&Condition, &[f64])> {
        self.iter().filter(|(_, onsets)| !onsets.is_empty())
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, o)| o.len()).sum()
    }

    fn slot(&mut self, condition: &Condition) -> &mut Vec<f64> {
        let idx = match self.entries.iter().position(|(c, _)| c == condition) {
            Some(idx) => idx,
            None => {
                self.entries.push((condition.clone(), Vec::new()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_configured_order_then_rest() {
        let index = OnsetIndex::new(["B", "A"]);
        let keys: Vec<_> = index.iter().map(|(c, _)| c.to_string()).collect();
        assert_eq!(keys, ["B", "A", "REST"]);
    }

    #[test]
    fn appends_in_presentation_order() {
        let mut index = OnsetIndex::new(["A", "B"]);
        index.push(&Condition::Rest, 0.0);
        index.push(&Condition::named("A"), 9.0);
        index.push(&Condition::named("A"), 27.0);

        assert_eq!(index.get(&Condition::named("A")), &[9.0, 27.0]);
        assert_eq!(index.get(&Condition::Rest), &[0.0]);
        assert!(index.get(&Condition::named("B")).is_empty());
        assert_eq!(index.total(), 3);

        let presented: Vec<_> = index.presented().map(|(c, _)| c.to_string()).collect();
        assert_eq!(presented, ["A", "REST"]);
    }

    #[test]
    fn unknown_condition_gets_its_own_slot() {
        let mut index = OnsetIndex::new(["A"]);
        index.push(&Condition::named("Z"), 1.5);
        assert_eq!(index.get(&Condition::named("Z")), &[1.5]);
    }
}
