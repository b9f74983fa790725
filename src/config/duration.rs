use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

/// Duration written as a Go-style string in the config file: "250ms", "10s", "1m30s".
/// Bare integers are read as seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Duration(StdDuration);

impl Duration {
    pub const fn from_secs(secs: u64) -> Self {
        Duration(StdDuration::from_secs(secs))
    }

    pub const fn from_millis(millis: u64) -> Self {
        Duration(StdDuration::from_millis(millis))
    }

    #[inline]
    pub fn as_std(&self) -> StdDuration {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<StdDuration> for Duration {
    fn from(d: StdDuration) -> Self {
        Duration(d)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration '{input}': {reason}")]
pub struct ParseDurationError {
    input: String,
    reason: &'static str,
}

impl ParseDurationError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

fn unit_nanos(unit: &str) -> Option<f64> {
    let nanos = match unit {
        "ns" => 1.0,
        "us" | "µs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60.0 * 1e9,
        "h" => 3600.0 * 1e9,
        _ => return None,
    };
    Some(nanos)
}

impl FromStr for Duration {
    type Err = ParseDurationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim();
        if s.is_empty() {
            return Err(ParseDurationError::new(input, "empty"));
        }
        if s == "0" {
            return Ok(Duration(StdDuration::ZERO));
        }

        let mut nanos = 0f64;
        let mut rest = s;
        while !rest.is_empty() {
            let split = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .ok_or_else(|| ParseDurationError::new(input, "missing unit"))?;
            if split == 0 {
                return Err(ParseDurationError::new(input, "expected a number"));
            }
            let (number, tail) = rest.split_at(split);
            let unit_len = tail
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(tail.len());
            let (unit, tail) = tail.split_at(unit_len);

            let value: f64 = number
                .parse()
                .map_err(|_| ParseDurationError::new(input, "malformed number"))?;
            let scale = unit_nanos(unit).ok_or_else(|| ParseDurationError::new(input, "unknown unit"))?;

            nanos += value * scale;
            rest = tail;
        }

        Ok(Duration(StdDuration::from_nanos(nanos.round() as u64)))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.as_millis();
        if millis == 0 {
            return write!(f, "0s");
        }
        if millis % 1000 != 0 {
            return write!(f, "{}ms", millis);
        }

        let secs = self.0.as_secs();
        let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if h > 0 {
            write!(f, "{}h", h)?;
        }
        if m > 0 {
            write!(f, "{}m", m)?;
        }
        if s > 0 {
            write!(f, "{}s", s)?;
        }
        Ok(())
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a duration such as '10s' or '250ms', or whole seconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                v.parse().map_err(de::Error::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                Ok(Duration::from_secs(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                u64::try_from(v)
                    .map(Duration::from_secs)
                    .map_err(|_| de::Error::custom("duration cannot be negative"))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("250ms".parse::<Duration>().unwrap().as_std(), StdDuration::from_millis(250));
        assert_eq!("10s".parse::<Duration>().unwrap().as_std(), StdDuration::from_secs(10));
        assert_eq!("2m".parse::<Duration>().unwrap().as_std(), StdDuration::from_secs(120));
        assert_eq!("1.5s".parse::<Duration>().unwrap().as_std(), StdDuration::from_millis(1500));
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!("1m30s".parse::<Duration>().unwrap().as_std(), StdDuration::from_secs(90));
        assert_eq!("1h0m5s".parse::<Duration>().unwrap().as_std(), StdDuration::from_secs(3605));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Duration>().is_err());
        assert!("10".parse::<Duration>().is_err());
        assert!("10 parsecs".parse::<Duration>().is_err());
        assert!("s".parse::<Duration>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Duration::from_secs(10).to_string(), "10s");
        assert_eq!(Duration::from_secs(5400).to_string(), "1h30m");
        assert_eq!(Duration::from_millis(3250).to_string(), "3250ms");
        assert_eq!(Duration::default().to_string(), "0s");
    }

    #[test]
    fn test_deserialize_from_yaml() {
        #[derive(Deserialize)]
        struct Holder {
            a: Duration,
            b: Duration,
        }

        let h: Holder = serde_yml::from_str("a: 3s\nb: 7\n").unwrap();
        assert_eq!(h.a, Duration::from_secs(3));
        assert_eq!(h.b, Duration::from_secs(7));
    }
}
