//! Parameter addressing: enumerated slots plus free-form string keys.

use serde::{Deserialize, Serialize};

/// Built-in float parameters stored in a fixed array inside the context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ParamId {
    SpeedX,
    SpeedY,
    SpeedZ,
    Speed,
    AimYaw,
    AimPitch,
    IsGrounded,
    IsWalking,
    IsRunning,
    IsSprinting,
    SprintHeld,
    WalkThreshold,
    RunThreshold,
    SprintThreshold,
}

impl ParamId {
    pub const COUNT: usize = 14;

    pub const ALL: [ParamId; ParamId::COUNT] = [
        ParamId::SpeedX,
        ParamId::SpeedY,
        ParamId::SpeedZ,
        ParamId::Speed,
        ParamId::AimYaw,
        ParamId::AimPitch,
        ParamId::IsGrounded,
        ParamId::IsWalking,
        ParamId::IsRunning,
        ParamId::IsSprinting,
        ParamId::SprintHeld,
        ParamId::WalkThreshold,
        ParamId::RunThreshold,
        ParamId::SprintThreshold,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ParamId::SpeedX => "speed_x",
            ParamId::SpeedY => "speed_y",
            ParamId::SpeedZ => "speed_z",
            ParamId::Speed => "speed",
            ParamId::AimYaw => "aim_yaw",
            ParamId::AimPitch => "aim_pitch",
            ParamId::IsGrounded => "is_grounded",
            ParamId::IsWalking => "is_walking",
            ParamId::IsRunning => "is_running",
            ParamId::IsSprinting => "is_sprinting",
            ParamId::SprintHeld => "sprint_held",
            ParamId::WalkThreshold => "walk_threshold",
            ParamId::RunThreshold => "run_threshold",
            ParamId::SprintThreshold => "sprint_threshold",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }

    /// Value a fresh context starts with.
    pub fn default_value(self) -> f32 {
        match self {
            ParamId::WalkThreshold => 0.65,
            ParamId::RunThreshold => 1.0,
            ParamId::SprintThreshold => 1.5,
            ParamId::IsGrounded => 1.0,
            _ => 0.0,
        }
    }
}

/// Either an enumerated slot or a string key.
///
/// Serializes untagged: `"speed_x"` and `"my_param"` are both plain strings;
/// names matching a [`ParamId`] deserialize to the enumerated slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamKey {
    Id(ParamId),
    Name(String),
}

impl ParamKey {
    pub fn as_str(&self) -> &str {
        match self {
            ParamKey::Id(id) => id.name(),
            ParamKey::Name(name) => name,
        }
    }
}

impl From<ParamId> for ParamKey {
    fn from(id: ParamId) -> Self {
        ParamKey::Id(id)
    }
}

impl From<&str> for ParamKey {
    fn from(name: &str) -> Self {
        match ParamId::from_name(name) {
            Some(id) => ParamKey::Id(id),
            None => ParamKey::Name(name.to_string()),
        }
    }
}

impl From<String> for ParamKey {
    fn from(name: String) -> Self {
        match ParamId::from_name(&name) {
            Some(id) => ParamKey::Id(id),
            None => ParamKey::Name(name),
        }
    }
}

impl Serialize for ParamKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ParamKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ParamKey::from(raw))
    }
}

impl std::fmt::Display for ParamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_in_index_order() {
        for (i, id) in ParamId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
        }
    }

    #[test]
    fn key_from_known_name_resolves_to_slot() {
        assert_eq!(ParamKey::from("speed"), ParamKey::Id(ParamId::Speed));
        assert_eq!(
            ParamKey::from("attack_charge"),
            ParamKey::Name("attack_charge".into())
        );
    }

    #[test]
    fn key_json_is_plain_string() {
        let key: ParamKey = serde_json::from_str("\"aim_yaw\"").unwrap();
        assert_eq!(key, ParamKey::Id(ParamId::AimYaw));
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"aim_yaw\"");
    }
}
