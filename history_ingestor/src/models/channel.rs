//! Release channels of the tracked distribution.
//!
//! Each channel is a long-lived branch in the nixpkgs history. The set is fixed at
//! compile time; configuration only chooses which of them to track.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// A named release track, serialized as its branch name (e.g. `"nixos-unstable"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Rolling package set, advanced after Hydra's nixpkgs jobset passes.
    #[serde(rename = "nixpkgs-unstable")]
    NixpkgsUnstable,
    /// Rolling NixOS channel, gated on the NixOS tested jobs.
    #[serde(rename = "nixos-unstable")]
    NixosUnstable,
    /// NixOS 24.05 stable release branch.
    #[serde(rename = "nixos-24.05")]
    Nixos2405,
    /// NixOS 24.11 stable release branch.
    #[serde(rename = "nixos-24.11")]
    Nixos2411,
    /// NixOS 25.05 stable release branch.
    #[serde(rename = "nixos-25.05")]
    Nixos2505,
}

impl Channel {
    /// Every channel in declaration order.
    pub const ALL: [Channel; 5] = [
        Channel::NixpkgsUnstable,
        Channel::NixosUnstable,
        Channel::Nixos2405,
        Channel::Nixos2411,
        Channel::Nixos2505,
    ];

    /// Branch name of this channel in the remote history.
    pub const fn branch(self) -> &'static str {
        match self {
            Channel::NixpkgsUnstable => "nixpkgs-unstable",
            Channel::NixosUnstable => "nixos-unstable",
            Channel::Nixos2405 => "nixos-24.05",
            Channel::Nixos2411 => "nixos-24.11",
            Channel::Nixos2505 => "nixos-25.05",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.branch())
    }
}

/// Returned when a string names no known channel.
#[derive(Debug, Snafu)]
#[snafu(display("unknown channel: {name}"))]
pub struct UnknownChannelError {
    name: String,
}

impl FromStr for Channel {
    type Err = UnknownChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Channel::ALL
            .into_iter()
            .find(|c| c.branch() == wanted)
            .ok_or_else(|| UnknownChannelError {
                name: wanted.to_string(),
            })
    }
}
