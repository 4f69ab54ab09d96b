//! Opaque animation-source handles, the external clip table, and the
//! fixed-capacity slot arena used for index-stable hot swaps.

use hashbrown::HashMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque reference to an externally resolved animation source.
///
/// JSON form is a bare number or string. Strings holding a plain `u32`
/// read back as [`SourceRef::Id`], so ids survive as object keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum SourceRef {
    Id(u32),
    Key(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSourceRef {
    Id(u32),
    Key(String),
}

impl<'de> Deserialize<'de> for SourceRef {
    fn deserialize<D>(deserializer: D) -> Result<SourceRef, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawSourceRef::deserialize(deserializer)? {
            RawSourceRef::Id(id) => SourceRef::Id(id),
            RawSourceRef::Key(key) => match key.parse::<u32>() {
                Ok(id) if id.to_string() == key => SourceRef::Id(id),
                _ => SourceRef::Key(key),
            },
        })
    }
}

impl From<&str> for SourceRef {
    fn from(key: &str) -> Self {
        SourceRef::Key(key.to_string())
    }
}

impl From<u32> for SourceRef {
    fn from(id: u32) -> Self {
        SourceRef::Id(id)
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceRef::Id(id) => write!(f, "#{id}"),
            SourceRef::Key(key) => f.write_str(key),
        }
    }
}

/// What the engine needs to know about a resolved source.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipInfo {
    /// Length in seconds.
    pub length: f32,
    #[serde(default)]
    pub looping: bool,
}

/// Resolves source handles; implemented by the host.
pub trait ClipTable {
    fn clip(&self, source: &SourceRef) -> Option<ClipInfo>;
}

/// Table with nothing in it; every lookup misses.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoClips;

impl ClipTable for NoClips {
    fn clip(&self, _source: &SourceRef) -> Option<ClipInfo> {
        None
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StaticClipTable {
    clips: HashMap<SourceRef, ClipInfo>,
}

impl StaticClipTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<SourceRef>, length: f32, looping: bool) {
        self.clips
            .insert(source.into(), ClipInfo { length, looping });
    }

    pub fn with(mut self, source: impl Into<SourceRef>, length: f32, looping: bool) -> Self {
        self.insert(source, length, looping);
        self
    }
}

impl ClipTable for StaticClipTable {
    fn clip(&self, source: &SourceRef) -> Option<ClipInfo> {
        self.clips.get(source).copied()
    }
}

/// Fixed-capacity arena of source slots.
///
/// Capacity is set at construction; replacing a slot never reallocates or
/// renumbers, so indices handed out stay valid for the runtime's lifetime.
#[derive(Clone, Debug)]
pub struct SourceSlots {
    slots: Box<[SourceRef]>,
}

impl SourceSlots {
    pub fn new(sources: Vec<SourceRef>) -> Self {
        Self {
            slots: sources.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&SourceRef> {
        self.slots.get(index)
    }

    /// Swap the content of one slot. Returns false for out-of-range indices.
    pub fn replace(&mut self, index: usize, source: SourceRef) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = source;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceRef> {
        self.slots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_keeps_capacity_and_order() {
        let mut slots = SourceSlots::new(vec!["idle".into(), "walk".into(), "run".into()]);
        assert!(slots.replace(1, "limp".into()));
        assert!(!slots.replace(3, "nope".into()));
        let keys: Vec<String> = slots.iter().map(|s| s.to_string()).collect();
        assert_eq!(keys, vec!["idle", "limp", "run"]);
        assert_eq!(slots.len(), 3);
    }

    #[test]
    fn source_ref_json_is_untagged() {
        let a: SourceRef = serde_json::from_str("7").unwrap();
        let b: SourceRef = serde_json::from_str("\"walk\"").unwrap();
        assert_eq!(a, SourceRef::Id(7));
        assert_eq!(b, SourceRef::Key("walk".into()));
    }

    #[test]
    fn static_table_keeps_numeric_ids_through_json() {
        let table = StaticClipTable::new().with(7u32, 0.8, false).with("walk", 1.2, true);
        let json = serde_json::to_string(&table).unwrap();
        let back: StaticClipTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.clip(&SourceRef::Id(7)).map(|c| c.length), Some(0.8));
        assert_eq!(back.clip(&"walk".into()).map(|c| c.looping), Some(true));

        let parsed: StaticClipTable =
            serde_json::from_str(r#"{"clips":{"12":{"length":0.5},"007":{"length":0.25}}}"#).unwrap();
        assert_eq!(parsed.clip(&SourceRef::Id(12)).map(|c| c.length), Some(0.5));
        assert_eq!(parsed.clip(&"007".into()).map(|c| c.length), Some(0.25));
    }

    #[test]
    fn static_table_lookup() {
        let table = StaticClipTable::new().with("attack", 0.8, false);
        assert_eq!(table.clip(&"attack".into()).map(|c| c.length), Some(0.8));
        assert!(table.clip(&"missing".into()).is_none());
        assert!(NoClips.clip(&"attack".into()).is_none());
    }
}
