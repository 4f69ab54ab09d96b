//! Body channels that states compete for.
//!
//! A [`ChannelMask`] is a `u32` bitset; each set bit is one channel in the
//! cost ledger. Masks deserialize from a raw number, a single channel name
//! or a list of names (`["double_hand", "head"]`).

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MaskRepr", into = "u32")]
pub struct ChannelMask(pub u32);

impl ChannelMask {
    pub const NONE: Self = Self(0);
    pub const RIGHT_HAND: Self = Self(1 << 0);
    pub const LEFT_HAND: Self = Self(1 << 1);
    pub const RIGHT_LEG: Self = Self(1 << 2);
    pub const LEFT_LEG: Self = Self(1 << 3);
    pub const HEAD: Self = Self(1 << 4);
    pub const BODY_SPINE: Self = Self(1 << 5);
    pub const HEART: Self = Self(1 << 6);
    pub const EYE: Self = Self(1 << 7);
    pub const EAR: Self = Self(1 << 8);
    pub const TARGET: Self = Self(1 << 9);

    pub const DOUBLE_HAND: Self = Self(Self::RIGHT_HAND.0 | Self::LEFT_HAND.0);
    pub const DOUBLE_LEG: Self = Self(Self::RIGHT_LEG.0 | Self::LEFT_LEG.0);
    pub const FOUR_LIMBS: Self = Self(Self::DOUBLE_HAND.0 | Self::DOUBLE_LEG.0);
    pub const ALL_BODY_ACTIVE: Self = Self(Self::FOUR_LIMBS.0 | Self::HEAD.0 | Self::BODY_SPINE.0);
    pub const ALL_BODY_AND_HEART_AND_MORE: Self =
        Self(Self::ALL_BODY_ACTIVE.0 | Self::HEART.0 | Self::EYE.0 | Self::EAR.0);

    /// Number of addressable channels.
    pub const CAPACITY: usize = 32;

    const NAMED: &'static [(&'static str, ChannelMask)] = &[
        ("none", Self::NONE),
        ("right_hand", Self::RIGHT_HAND),
        ("left_hand", Self::LEFT_HAND),
        ("right_leg", Self::RIGHT_LEG),
        ("left_leg", Self::LEFT_LEG),
        ("head", Self::HEAD),
        ("body_spine", Self::BODY_SPINE),
        ("heart", Self::HEART),
        ("eye", Self::EYE),
        ("ear", Self::EAR),
        ("target", Self::TARGET),
        ("double_hand", Self::DOUBLE_HAND),
        ("double_leg", Self::DOUBLE_LEG),
        ("four_limbs", Self::FOUR_LIMBS),
        ("all_body_active", Self::ALL_BODY_ACTIVE),
        ("all_body_and_heart_and_more", Self::ALL_BODY_AND_HEART_AND_MORE),
    ];

    /// Single-bit mask for channel `index`.
    #[inline]
    pub fn channel(index: usize) -> Self {
        if index < Self::CAPACITY {
            Self(1 << index)
        } else {
            Self::NONE
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, m)| *m)
    }

    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn contains(self, other: ChannelMask) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn intersects(self, other: ChannelMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Indices of the set channels, lowest first.
    pub fn channels(self) -> impl Iterator<Item = usize> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let index = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some(index)
        })
    }
}

impl BitOr for ChannelMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChannelMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ChannelMask {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for ChannelMask {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl From<ChannelMask> for u32 {
    fn from(mask: ChannelMask) -> u32 {
        mask.0
    }
}

impl fmt::Debug for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelMask({:#b})", self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MaskRepr {
    Bits(u32),
    Name(String),
    Names(Vec<String>),
}

impl TryFrom<MaskRepr> for ChannelMask {
    type Error = String;

    fn try_from(repr: MaskRepr) -> Result<Self, Self::Error> {
        let lookup = |name: &str| {
            ChannelMask::from_name(name).ok_or_else(|| format!("unknown channel '{name}'"))
        };
        match repr {
            MaskRepr::Bits(bits) => Ok(ChannelMask(bits)),
            MaskRepr::Name(name) => lookup(&name),
            MaskRepr::Names(names) => names
                .iter()
                .try_fold(ChannelMask::NONE, |acc, name| Ok(acc | lookup(name)?)),
        }
    }
}
