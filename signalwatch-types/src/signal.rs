//! Discrete labels carried by every snapshot.

use core::fmt;
use core::str::FromStr;

/// Congestion classification of recent traffic density.
///
/// Derived from the averaged vehicle count, never from a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(index_only))]
pub enum CongestionLevel {
    #[default]
    #[cfg_attr(feature = "minicbor", n(0))]
    Low,
    #[cfg_attr(feature = "minicbor", n(1))]
    Medium,
    #[cfg_attr(feature = "minicbor", n(2))]
    High,
}

impl CongestionLevel {
    /// All levels, least congested first.
    pub const ALL: [CongestionLevel; 3] = [Self::Low, Self::Medium, Self::High];

    /// Wire label ("low", "medium", "high").
    pub fn label(&self) -> &'static str {
        match self {
            CongestionLevel::Low => "low",
            CongestionLevel::Medium => "medium",
            CongestionLevel::High => "high",
        }
    }
}

impl fmt::Display for CongestionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CongestionLevel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(s))
            .ok_or(UnknownLabel)
    }
}

/// The lamp currently shown by the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(index_only))]
pub enum SignalPhase {
    #[default]
    #[cfg_attr(feature = "minicbor", n(0))]
    Green,
    #[cfg_attr(feature = "minicbor", n(1))]
    Yellow,
    #[cfg_attr(feature = "minicbor", n(2))]
    Red,
}

impl SignalPhase {
    pub const ALL: [SignalPhase; 3] = [Self::Green, Self::Yellow, Self::Red];

    /// The phase that follows this one in the Green -> Yellow -> Red cycle.
    pub fn next(&self) -> SignalPhase {
        match self {
            SignalPhase::Green => SignalPhase::Yellow,
            SignalPhase::Yellow => SignalPhase::Red,
            SignalPhase::Red => SignalPhase::Green,
        }
    }

    /// Wire label ("green", "yellow", "red").
    pub fn label(&self) -> &'static str {
        match self {
            SignalPhase::Green => "green",
            SignalPhase::Yellow => "yellow",
            SignalPhase::Red => "red",
        }
    }
}

impl fmt::Display for SignalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SignalPhase {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.label().eq_ignore_ascii_case(s))
            .ok_or(UnknownLabel)
    }
}

/// Returned when parsing a label that is not one of the three known values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownLabel;

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown label")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for UnknownLabel {}
