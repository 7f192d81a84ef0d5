use std::{fmt::Display, str::FromStr};

/// A bitrate in kilobits per second, as the encoder understands it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Bitrate(u32);

impl Bitrate {
    pub const fn from_kbps(kbps: u32) -> Self {
        Self(kbps)
    }

    pub fn kbps(self) -> u32 {
        self.0
    }
}

impl FromStr for Bitrate {
    type Err = Box<dyn std::error::Error + Sync + Send>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(num_prefix) = s.to_lowercase().strip_suffix('k') {
            Ok(Self(num_prefix.parse()?))
        } else {
            Err(Box::from("Bitrate does not end with 'k'"))
        }
    }
}

impl Display for Bitrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}k", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_encoder_notation() {
        assert_eq!("128k".parse::<Bitrate>().unwrap(), Bitrate::from_kbps(128));
        assert_eq!("192K".parse::<Bitrate>().unwrap().to_string(), "192k");
        assert!("128".parse::<Bitrate>().is_err());
        assert!("fastk".parse::<Bitrate>().is_err());
    }
}
