use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Upper bound of a field's cardinality. Serialized the FHIR way: `"1"`, `"0"`, `"*"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Max {
    Bounded(u32),
    Unbounded,
}

impl Max {
    pub fn allows(&self, count: usize) -> bool {
        match self {
            Max::Bounded(max) => count <= *max as usize,
            Max::Unbounded => true,
        }
    }

    /// True when more than one value may be present.
    pub fn is_repeating(&self) -> bool {
        match self {
            Max::Bounded(max) => *max > 1,
            Max::Unbounded => true,
        }
    }
}

impl Default for Max {
    fn default() -> Self {
        Max::Bounded(1)
    }
}

impl fmt::Display for Max {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Max::Bounded(max) => write!(f, "{max}"),
            Max::Unbounded => f.write_str("*"),
        }
    }
}

impl Serialize for Max {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Max {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MaxVisitor;

        impl Visitor<'_> for MaxVisitor {
            type Value = Max;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a cardinality bound such as \"1\" or \"*\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Max, E> {
                u32::try_from(v)
                    .map(Max::Bounded)
                    .map_err(|_| E::custom(format!("cardinality bound {v} is too large")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Max, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom("cardinality bound must not be negative"))
                    .and_then(|v| self.visit_u64(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Max, E> {
                if v == "*" {
                    return Ok(Max::Unbounded);
                }
                v.parse::<u32>()
                    .map(Max::Bounded)
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(MaxVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_parses_fhir_notation() {
        let star: Max = serde_json::from_str("\"*\"").unwrap();
        let one: Max = serde_json::from_str("\"1\"").unwrap();
        let zero: Max = serde_json::from_str("0").unwrap();
        assert_eq!(star, Max::Unbounded);
        assert_eq!(one, Max::Bounded(1));
        assert_eq!(zero, Max::Bounded(0));
        assert!(serde_json::from_str::<Max>("\"many\"").is_err());
    }

    #[test]
    fn test_max_bounds() {
        assert!(Max::Bounded(1).allows(1));
        assert!(!Max::Bounded(1).allows(2));
        assert!(!Max::Bounded(0).allows(1));
        assert!(Max::Unbounded.allows(10_000));
        assert!(!Max::Bounded(1).is_repeating());
        assert!(Max::Unbounded.is_repeating());
        assert_eq!(serde_json::to_string(&Max::Unbounded).unwrap(), "\"*\"");
    }
}
