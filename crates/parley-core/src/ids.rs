use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned by strict id parsing at API boundaries.
#[derive(Clone, Debug, thiserror::Error)]
#[error("malformed identifier: {0}")]
pub struct InvalidId(pub String);

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Strict parse: requires the `$prefix_` prefix and a valid UUID
            /// suffix. Used where a caller-supplied id must be well-formed
            /// before any store access.
            pub fn parse(s: &str) -> Result<Self, InvalidId> {
                let suffix = s
                    .strip_prefix(concat!($prefix, "_"))
                    .ok_or_else(|| InvalidId(s.to_owned()))?;
                Uuid::try_parse(suffix).map_err(|_| InvalidId(s.to_owned()))?;
                Ok(Self(s.to_owned()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(UserId, "user");
branded_id!(ConversationId, "conv");
