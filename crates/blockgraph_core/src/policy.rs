// SPDX-License-Identifier: MIT OR Apache-2.0
//! Point policy bitset.
//!
//! A policy controls whether a point may hold a literal value, how many
//! connections it accepts and whether its type may be converted when a
//! connection is made.

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Bitset of point capabilities
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct PointPolicy(u8);

impl PointPolicy {
    /// No capability at all
    pub const NONE: Self = Self(0);
    /// The point may hold a literal value
    pub const VALUE: Self = Self(1 << 0);
    /// The point accepts at most one connection
    pub const SINGLE_CONNECTION: Self = Self(1 << 1);
    /// The point accepts any number of connections
    pub const MULTIPLE_CONNECTIONS: Self = Self(1 << 2);
    /// The point accepts connections from convertible types
    pub const CONVERSION: Self = Self(1 << 3);
    /// Policy given to points that declare none
    pub const DEFAULT: Self = Self(Self::VALUE.0 | Self::SINGLE_CONNECTION.0 | Self::CONVERSION.0);

    const LABELS: [(&'static str, Self); 4] = [
        ("VALUE", Self::VALUE),
        ("SINGLE_CONNECTION", Self::SINGLE_CONNECTION),
        ("MULTIPLE_CONNECTIONS", Self::MULTIPLE_CONNECTIONS),
        ("CONVERSION", Self::CONVERSION),
    ];

    /// Build a policy from raw bits
    pub fn from_bits(bits: u8) -> Result<Self> {
        let known = Self::LABELS.iter().fold(0, |acc, (_, flag)| acc | flag.0);
        if bits & !known != 0 {
            return Err(GraphError::InvalidPolicy(format!("unknown bits {bits:#010b}")));
        }
        let policy = Self(bits);
        if policy.has(Self::SINGLE_CONNECTION) && policy.has(Self::MULTIPLE_CONNECTIONS) {
            return Err(GraphError::InvalidPolicy(
                "SINGLE_CONNECTION and MULTIPLE_CONNECTIONS are exclusive".to_string(),
            ));
        }
        Ok(policy)
    }

    /// Build a policy from label names such as `"VALUE"`
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let mut bits = 0;
        for label in labels {
            let label = label.as_ref();
            let flag = Self::LABELS
                .iter()
                .find(|(name, _)| *name == label)
                .map(|(_, flag)| *flag)
                .ok_or_else(|| GraphError::InvalidPolicy(format!("unknown label `{label}`")))?;
            bits |= flag.0;
        }
        Self::from_bits(bits)
    }

    /// Raw bits
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `flag` is set
    pub fn has(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// Label names of the set bits, in declaration order
    pub fn labels(self) -> Vec<&'static str> {
        Self::LABELS
            .iter()
            .filter(|(_, flag)| self.has(*flag))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Whether the point may be connected at all
    pub fn accepts_connections(self) -> bool {
        self.has(Self::SINGLE_CONNECTION) || self.has(Self::MULTIPLE_CONNECTIONS)
    }
}

impl Default for PointPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl BitOr for PointPolicy {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for PointPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointPolicy({})", self.labels().join(" | "))
    }
}

impl TryFrom<Vec<String>> for PointPolicy {
    type Error = GraphError;

    fn try_from(labels: Vec<String>) -> Result<Self> {
        Self::from_labels(&labels)
    }
}

impl From<PointPolicy> for Vec<String> {
    fn from(policy: PointPolicy) -> Self {
        policy.labels().into_iter().map(str::to_string).collect()
    }
}
