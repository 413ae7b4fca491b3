//! Committee role sorter.
//!
//! Orders a raw list of `"<name> - <role>"` entries into Chair, CoChair,
//! Member groups, each sorted lexicographically by the full original string.
//! Reliable family-name parsing is not feasible from this data (titles,
//! middle names, multiple surnames), so whole-string ordering is deliberate.

const ROLE_SEPARATOR: &str = " - ";

/// The only three roles the source system used, plus a fallback for entries
/// with no recognizable role. Unclassified entries keep their original
/// string and sort with the members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitteeRole {
    Chair,
    CoChair,
    Member,
    /// No `" - "` separator, or an unrecognized role literal. The original
    /// string is preserved for audit.
    Unclassified(String),
}

impl CommitteeRole {
    /// Classify one raw entry. Entries without the separator default to
    /// Member; this is more common in the source data than you'd think.
    pub fn classify(entry: &str) -> CommitteeRole {
        let Some((_name, role)) = entry.split_once(ROLE_SEPARATOR) else {
            return CommitteeRole::Unclassified(entry.to_string());
        };
        match role {
            "Committee Chair" => CommitteeRole::Chair,
            "Committee CoChair" => CommitteeRole::CoChair,
            "Committee Member" => CommitteeRole::Member,
            other => CommitteeRole::Unclassified(other.to_string()),
        }
    }
}

/// Sort committee entries into Chair ++ CoChair ++ Member order, each group
/// internally lexicographic by the entry's full original string.
pub fn order(entries: &[String]) -> Vec<String> {
    let mut chairs: Vec<String> = Vec::new();
    let mut cochairs: Vec<String> = Vec::new();
    let mut members: Vec<String> = Vec::new();

    for entry in entries {
        match CommitteeRole::classify(entry) {
            CommitteeRole::Chair => chairs.push(entry.clone()),
            CommitteeRole::CoChair => cochairs.push(entry.clone()),
            CommitteeRole::Member | CommitteeRole::Unclassified(_) => members.push(entry.clone()),
        }
    }

    chairs.sort();
    cochairs.sort();
    members.sort();

    let mut ordered = chairs;
    ordered.append(&mut cochairs);
    ordered.append(&mut members);
    ordered
}
