use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Body of `GET /api/leaderboard`.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub prize_pool: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub points: Points,
    #[serde(default)]
    pub last_scored_at: Option<String>,
    #[serde(default = "unranked_prize", deserialize_with = "null_as_unranked")]
    pub prize: String,
}

/// A score as the server sent it. Aggregated sums come back from the
/// database as decimal strings (`"112.0"`), plain scores as numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Points {
    Number(f64),
    Text(String),
}

impl Points {
    pub fn value(&self) -> f64 {
        match self {
            Points::Number(n) => *n,
            // Only numeric text gets past deserialization.
            Points::Text(t) => t.trim().parse().unwrap_or_default(),
        }
    }
}

impl From<f64> for Points {
    fn from(value: f64) -> Self {
        Points::Number(value)
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Points::Number(n) => write!(f, "{}", n),
            Points::Text(t) => write!(f, "{}", t.trim()),
        }
    }
}

impl<'de> Deserialize<'de> for Points {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Number(f64),
            Text(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Number(n) => Ok(Points::Number(n)),
            Wire::Text(t) => match t.trim().parse::<f64>() {
                Result::Ok(n) if n.is_finite() => Ok(Points::Text(t)),
                _ => Err(D::Error::custom(format!("points '{}' is not a number", t))),
            },
        }
    }
}

fn unranked_prize() -> String {
    String::from("-")
}

// The API sends explicit nulls for missing values as often as it omits the key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn null_as_unranked<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(|p| p.unwrap_or_else(unranked_prize))
}
