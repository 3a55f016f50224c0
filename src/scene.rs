//! Named scene index sets.
//!
//! A range is written as comma separated indices and inclusive spans, for
//! example `1-5, 8, 10-12`.

use log::warn;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::prefs::{camera_key, PrefStore};
use crate::protocol::Dialect;

/// A named, ordered set of scene indices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SceneRange {
    pub name: String,
    scenes: BTreeSet<u8>,
}

impl SceneRange {
    pub fn new(name: impl Into<String>, scenes: impl IntoIterator<Item = u8>) -> Self {
        Self {
            name: name.into(),
            scenes: scenes.into_iter().collect(),
        }
    }

    /// Every index from `start` to `end` inclusive.
    pub fn contiguous(name: impl Into<String>, start: u8, end: u8) -> Self {
        Self::new(name, start..=end)
    }

    /// Parse `text` and reject any index outside `valid`.
    pub fn parse(name: impl Into<String>, text: &str, valid: RangeInclusive<u8>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            scenes: parse_index_set(text, valid)?,
        })
    }

    pub fn scenes(&self) -> impl Iterator<Item = u8> + '_ {
        self.scenes.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn contains(&self, scene: u8) -> bool {
        self.scenes.contains(&scene)
    }

    /// Same indices, regardless of name.
    pub fn matches(&self, other: &SceneRange) -> bool {
        self.scenes == other.scenes
    }

    /// The indices this dialect can address, in order.
    pub fn valid_for(&self, dialect: &Dialect) -> Vec<u8> {
        self.scenes()
            .filter(|&s| dialect.is_valid_scene_index(s as i32))
            .collect()
    }

    /// `1-5,8`
    pub fn compact(&self) -> String {
        display_index_set(&self.scenes, false)
    }

    /// `1-5, 8`
    pub fn pretty(&self) -> String {
        display_index_set(&self.scenes, true)
    }

    /// `Name (1-5, 8)`, or just the indices when the range is unnamed.
    pub fn pretty_with_name(&self) -> String {
        if self.name.is_empty() {
            self.pretty()
        } else {
            format!("{} ({})", self.name, self.pretty())
        }
    }
}

impl fmt::Display for SceneRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty_with_name())
    }
}

/// Parse a comma separated list of indices and `a-b` spans.
pub fn parse_index_set(text: &str, valid: RangeInclusive<u8>) -> Result<BTreeSet<u8>> {
    let mut scenes = BTreeSet::new();
    for token in text.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (start, end) = match token.split_once('-') {
            Some((a, b)) => (parse_index(a, token)?, parse_index(b, token)?),
            None => {
                let index = parse_index(token, token)?;
                (index, index)
            }
        };
        if start > end {
            return Err(Error::invalid_argument(format!(
                "range '{}' runs backwards",
                token
            )));
        }
        for index in start..=end {
            if !valid.contains(&index) {
                return Err(Error::invalid_argument(format!(
                    "scene {} outside {}-{}",
                    index,
                    valid.start(),
                    valid.end()
                )));
            }
            scenes.insert(index);
        }
    }
    if scenes.is_empty() {
        return Err(Error::invalid_argument(format!("no scenes in '{}'", text)));
    }
    Ok(scenes)
}

fn parse_index(text: &str, token: &str) -> Result<u8> {
    text.trim()
        .parse::<u8>()
        .map_err(|_| Error::invalid_argument(format!("bad scene index in '{}'", token)))
}

/// Render indices with runs of three or more collapsed to `a-b`.
pub fn display_index_set(scenes: &BTreeSet<u8>, pretty: bool) -> String {
    let separator = if pretty { ", " } else { "," };
    let mut parts = Vec::new();
    let mut iter = scenes.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&end.wrapping_add(1)) && end < u8::MAX {
            end = iter.next().unwrap_or(end);
        }
        match end - start {
            0 => parts.push(start.to_string()),
            1 => {
                parts.push(start.to_string());
                parts.push(end.to_string());
            }
            _ => parts.push(format!("{}-{}", start, end)),
        }
    }
    parts.join(separator)
}

// =============================================================================
// Persistence
// =============================================================================

/// Store `ranges` under `camera.<camera>.sceneRanges.*`.
pub fn save_scene_ranges(store: &dyn PrefStore, camera: &str, ranges: &[SceneRange]) {
    let old = store
        .get_i32(&camera_key(camera, "sceneRanges.count"))
        .unwrap_or(0);
    for i in ranges.len() as i32..old {
        store.remove(&camera_key(camera, &format!("sceneRanges.{}.name", i)));
        store.remove(&camera_key(camera, &format!("sceneRanges.{}.scenes", i)));
    }
    store.set_i32(&camera_key(camera, "sceneRanges.count"), ranges.len() as i32);
    for (i, range) in ranges.iter().enumerate() {
        store.set(&camera_key(camera, &format!("sceneRanges.{}.name", i)), &range.name);
        store.set(
            &camera_key(camera, &format!("sceneRanges.{}.scenes", i)),
            &range.compact(),
        );
    }
}

/// Load ranges saved by [`save_scene_ranges`]. Entries that no longer parse
/// against `valid` are dropped.
pub fn load_scene_ranges(
    store: &dyn PrefStore,
    camera: &str,
    valid: RangeInclusive<u8>,
) -> Vec<SceneRange> {
    let count = store
        .get_i32(&camera_key(camera, "sceneRanges.count"))
        .unwrap_or(0);
    let mut ranges = Vec::new();
    for i in 0..count {
        let name = store
            .get(&camera_key(camera, &format!("sceneRanges.{}.name", i)))
            .unwrap_or_default();
        let Some(text) = store.get(&camera_key(camera, &format!("sceneRanges.{}.scenes", i)))
        else {
            continue;
        };
        match SceneRange::parse(name, &text, valid.clone()) {
            Ok(range) => ranges.push(range),
            Err(e) => warn!("dropping saved scene range {} for {}: {}", i, camera, e),
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPrefStore;
    use crate::protocol::DialectKind;

    #[test]
    fn test_parse_spans_and_singles() {
        let range = SceneRange::parse("stage", "1-5, 8,10 - 12", 1..=254).unwrap();
        assert_eq!(
            range.scenes().collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5, 8, 10, 11, 12]
        );
        assert_eq!(range.compact(), "1-5,8,10-12");
        assert_eq!(range.pretty(), "1-5, 8, 10-12");
        assert_eq!(range.to_string(), "stage (1-5, 8, 10-12)");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(SceneRange::parse("", "", 1..=9).is_err());
        assert!(SceneRange::parse("", "3-1", 1..=9).is_err());
        assert!(SceneRange::parse("", "1-10", 1..=9).is_err());
        assert!(SceneRange::parse("", "two", 1..=9).is_err());
        assert!(SceneRange::parse("", "0", 1..=9)
            .unwrap_err()
            .to_string()
            .contains("outside"));
    }

    #[test]
    fn test_short_runs_are_listed() {
        let range = SceneRange::new("", [1, 2, 4, 5, 6, 9]);
        assert_eq!(range.compact(), "1,2,4-6,9");
        let top = SceneRange::contiguous("", 253, 255);
        assert_eq!(top.compact(), "253-255");
    }

    #[test]
    fn test_matches_ignores_name() {
        let a = SceneRange::contiguous("a", 1, 3);
        let b = SceneRange::new("b", [3, 2, 1]);
        assert!(a.matches(&b));
        assert_ne!(a, b);
        assert!(!a.matches(&SceneRange::contiguous("a", 1, 4)));
    }

    #[test]
    fn test_valid_for_skips_reserved_scenes() {
        let range = SceneRange::contiguous("", 88, 101);
        let valid = range.valid_for(DialectKind::PtzOptics.dialect());
        assert_eq!(valid, vec![88, 89, 100, 101]);
        let sony = SceneRange::contiguous("", 98, 101).valid_for(DialectKind::Sony.dialect());
        assert_eq!(sony, vec![98, 99]);
    }

    #[test]
    fn test_ranges_persist_through_prefs() {
        let store = MemoryPrefStore::new();
        let ranges = vec![
            SceneRange::contiguous("wide shots", 1, 5),
            SceneRange::new("close", [20, 22]),
        ];
        save_scene_ranges(&store, "stage", &ranges);
        assert_eq!(load_scene_ranges(&store, "stage", 1..=254), ranges);

        save_scene_ranges(&store, "stage", &ranges[..1]);
        assert_eq!(
            store.keys_with_prefix("camera.stage.sceneRanges."),
            vec![
                "camera.stage.sceneRanges.0.name",
                "camera.stage.sceneRanges.0.scenes",
                "camera.stage.sceneRanges.count",
            ]
        );
        assert_eq!(load_scene_ranges(&store, "stage", 1..=254).len(), 1);
        // Shrinking the valid range drops what no longer fits.
        assert!(load_scene_ranges(&store, "stage", 1..=3).is_empty());
    }
}
