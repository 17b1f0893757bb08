//! Game-rule tables shown next to character sheets. Read-only.

use std::{collections::BTreeMap, sync::LazyLock};

use serde::Deserialize;

use crate::include_res;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Race {
    pub name: String,
    pub ability: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatAbility {
    pub name: String,
    pub description: String,
}

/// Abilities unlocked per stat, keyed by stat and then by the score that unlocks them.
pub type StatAbilities = BTreeMap<String, BTreeMap<u8, Vec<StatAbility>>>;

static RACES: LazyLock<BTreeMap<String, Race>> =
    LazyLock::new(|| include_res!(json, "/reference/races.json").expect("embedded races table"));

static STAT_ABILITIES: LazyLock<StatAbilities> =
    LazyLock::new(|| include_res!(json, "/reference/stat_abilities.json").expect("embedded stat abilities table"));

pub fn races() -> &'static BTreeMap<String, Race> {
    &RACES
}

pub fn stat_abilities() -> &'static StatAbilities {
    &STAT_ABILITIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_tables_parse() {
        let parsed: serde_json::Result<BTreeMap<String, Race>> = include_res!(json, "/reference/races.json");
        assert_eq!(parsed.unwrap().len(), 3);
        let parsed: serde_json::Result<StatAbilities> = include_res!(json, "/reference/stat_abilities.json");
        assert_eq!(parsed.unwrap().len(), 4);
    }

    #[test]
    fn statics_hold_the_full_tables() {
        assert_eq!(races().len(), 3);
        assert_eq!(stat_abilities().len(), 4);
    }

    #[test]
    fn tables_are_keyed_by_id_and_threshold() {
        assert_eq!(races()["gmur"].ability, "Stoneborn");

        let wil = &stat_abilities()["wil"];
        assert_eq!(wil.keys().copied().collect::<Vec<_>>(), [5, 10]);
        assert_eq!(wil[&5].len(), 2);
        assert!(stat_abilities().values().all(|by_score| by_score.values().all(|a| !a.is_empty())));
    }
}
