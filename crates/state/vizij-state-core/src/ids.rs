//! Identifiers for states and lanes.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(pub u32);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A state named either by id or by name; resolved against a graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateRef {
    Id(u32),
    Name(String),
}

impl From<StateId> for StateRef {
    fn from(id: StateId) -> Self {
        StateRef::Id(id.0)
    }
}

impl From<u32> for StateRef {
    fn from(id: u32) -> Self {
        StateRef::Id(id)
    }
}

impl From<&str> for StateRef {
    fn from(name: &str) -> Self {
        StateRef::Name(name.to_string())
    }
}

impl From<String> for StateRef {
    fn from(name: String) -> Self {
        StateRef::Name(name)
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateRef::Id(id) => write!(f, "#{id}"),
            StateRef::Name(name) => f.write_str(name),
        }
    }
}

/// Independent scheduling lanes, updated in declaration order each tick.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Basic,
    #[default]
    Main,
    Buff,
}

impl Lane {
    pub const COUNT: usize = 3;
    pub const ALL: [Lane; Lane::COUNT] = [Lane::Basic, Lane::Main, Lane::Buff];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Lane::Basic => "basic",
            Lane::Main => "main",
            Lane::Buff => "buff",
        }
    }

    /// Case-insensitive lookup by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Lane> {
        Lane::ALL.into_iter().find(|lane| lane.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
