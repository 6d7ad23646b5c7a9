use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Station/panel codes arrive as JSON numbers or strings depending on the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Code(pub String);

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Code(s)),
            Value::Number(n) => Ok(Code(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "expected string or number code, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Code {
    fn from(s: &str) -> Self {
        Code(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub station_code: Code,
    #[serde(default)]
    pub station_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub panel_code: Code,
    #[serde(default)]
    pub panel_region: String,
    #[serde(default)]
    pub is_macro_region: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewingStation {
    pub viewing_station_code: Code,
    #[serde(default)]
    pub viewing_station_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buyer {
    #[serde(default)]
    pub buyer_code: Option<Code>,
    #[serde(default)]
    pub buyer_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advertiser {
    #[serde(default)]
    pub advertiser_code: Option<Code>,
    #[serde(default)]
    pub advertiser_name: String,
}

/// Entries of a reference list that can be filtered and looked up by name.
pub trait Named {
    const KIND: &'static str;
    fn display_name(&self) -> &str;
}

impl Named for Station {
    const KIND: &'static str = "station";
    fn display_name(&self) -> &str {
        &self.station_name
    }
}

impl Named for Panel {
    const KIND: &'static str = "panel";
    fn display_name(&self) -> &str {
        &self.panel_region
    }
}

impl Named for ViewingStation {
    const KIND: &'static str = "viewing station";
    fn display_name(&self) -> &str {
        &self.viewing_station_name
    }
}

impl Named for Buyer {
    const KIND: &'static str = "buyer";
    fn display_name(&self) -> &str {
        &self.buyer_name
    }
}

impl Named for Advertiser {
    const KIND: &'static str = "advertiser";
    fn display_name(&self) -> &str {
        &self.advertiser_name
    }
}
