use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Fixed geographic partition of the service area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    #[serde(rename = "oriental")]
    Eastern,
    #[serde(rename = "occidental")]
    Western,
}

impl Zone {
    pub const ALL: [Zone; 2] = [Zone::Eastern, Zone::Western];

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Eastern => "oriental",
            Zone::Western => "occidental",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "oriental" => Ok(Zone::Eastern),
            "occidental" => Ok(Zone::Western),
            other => Err(AppError::Validation(format!(
                "unknown zone: {other}, expected oriental/occidental"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Zone;

    #[test]
    fn parses_wire_names() {
        assert_eq!("oriental".parse::<Zone>().unwrap(), Zone::Eastern);
        assert_eq!("occidental".parse::<Zone>().unwrap(), Zone::Western);
        assert!("north".parse::<Zone>().is_err());
    }

    #[test]
    fn serializes_as_wire_name() {
        assert_eq!(serde_json::to_string(&Zone::Western).unwrap(), "\"occidental\"");
    }
}
