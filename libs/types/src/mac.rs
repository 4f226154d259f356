//! 6-byte device identifiers for gateways and tags.
//!
//! Macs are carried in binary form on the wire and in text form
//! (`aa:bb:cc:dd:ee:ff`, lowercase hex) everywhere else: map keys, log fields,
//! CSV rows, and cache file names (with `:` swapped for `-`).

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing the text form of a [`Mac`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MacParseError {
    /// Expected six `:`-separated octets
    #[error("invalid mac format: expected 6 colon-separated octets, got {got} in '{input}'")]
    WrongGroupCount { got: usize, input: String },

    /// One of the octets was not valid hex
    #[error("invalid mac octet '{octet}' in '{input}'")]
    InvalidOctet { octet: String, input: String },
}

/// A 6-byte MAC address identifying a gateway or a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mac(pub [u8; 6]);

impl Mac {
    /// Raw bytes, wire order.
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Text form with `:` replaced by `-`, safe for use as a file name.
    pub fn file_stem(&self) -> String {
        self.to_string().replace(':', "-")
    }
}

impl From<[u8; 6]> for Mac {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for Mac {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups: Vec<&str> = s.split(':').collect();
        if groups.len() != 6 {
            return Err(MacParseError::WrongGroupCount {
                got: groups.len(),
                input: s.to_string(),
            });
        }
        let mut bytes = [0u8; 6];
        for (i, group) in groups.iter().enumerate() {
            bytes[i] = u8::from_str_radix(group, 16).map_err(|_| MacParseError::InvalidOctet {
                octet: group.to_string(),
                input: s.to_string(),
            })?;
        }
        Ok(Self(bytes))
    }
}

// serde uses the text form so macs read naturally in JSON and logs
impl Serialize for Mac {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Mac {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
