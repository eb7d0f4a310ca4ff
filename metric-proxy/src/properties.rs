use indexmap::IndexSet;

use crate::event::Properties;

/// In each tracking event, these are the properties which we retain and pass
/// through to mixpanel. All other properties are dropped.
pub const DEFAULT_PROPERTY_WHITELIST: &[&str] = &[
    "distinct_id",
    "time",
    "token",
    "$app_version",
    "HTTPS Everywhere",
    "Tracking Protection Mode",
    "Ad Block",
    "Regional Ad Block",
    "Fingerprinting Protection",
    "JavaScript",
    "Block Ads and Tracking",
    "Block 3rd Party Cookies",
    "Block Scripts",
    "Top Shield",
];

#[derive(Debug, Clone)]
pub struct PropertyWhitelist {
    names: IndexSet<String>,
}

impl Default for PropertyWhitelist {
    fn default() -> Self {
        PropertyWhitelist::new(DEFAULT_PROPERTY_WHITELIST.iter().copied())
    }
}

impl PropertyWhitelist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PropertyWhitelist {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Extend the whitelist with extra names, typically the persisted
    /// attribution keys.
    pub fn with<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Copy of `properties` holding only whitelisted keys, in their original order.
    pub fn filter(&self, properties: &Properties) -> Properties {
        properties
            .iter()
            .filter(|(key, _)| self.contains(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}
