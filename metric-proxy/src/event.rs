use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::ProxyError;
use crate::token::TokenWhitelist;

/// Ordered property bag of a tracking event. Values keep their JSON type.
pub type Properties = Map<String, Value>;

#[derive(Debug, Deserialize)]
pub struct EventFormData {
    pub data: Option<String>,
    pub verbose: Option<String>,
}

/// A mixpanel `/track` event as sent by the client libraries.
///
/// Both fields are optional on the wire so that a missing one surfaces as a
/// validation error rather than a parse error. Unknown top-level fields are
/// carried through untouched.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TrackEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Events posted to `/track` in one request, in client order.
pub type EventBatch = Vec<TrackEvent>;

impl TrackEvent {
    pub fn new(event: impl Into<String>, properties: Properties) -> Self {
        TrackEvent {
            event: Some(event.into()),
            properties: Some(properties),
            other: Map::new(),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.properties
            .as_ref()
            .and_then(|properties| properties.get("token"))
            .and_then(Value::as_str)
    }

    /// Properties of the event, created empty if the event had none.
    pub fn properties_mut(&mut self) -> &mut Properties {
        self.properties.get_or_insert_with(Map::new)
    }

    /// Whether the event already carries a value for `key`. A null value
    /// counts as absent.
    pub fn has_property(&self, key: &str) -> bool {
        self.properties
            .as_ref()
            .and_then(|properties| properties.get(key))
            .is_some_and(|value| !value.is_null())
    }
}

/// Structural checks shared by the GET and POST paths.
#[derive(Debug, Clone)]
pub struct EventValidator {
    tokens: TokenWhitelist,
}

impl EventValidator {
    pub fn new(tokens: TokenWhitelist) -> Self {
        EventValidator { tokens }
    }

    pub fn assert_valid(&self, event: &TrackEvent) -> Result<(), ProxyError> {
        match &event.event {
            Some(name) if !name.is_empty() => {}
            _ => return Err(ProxyError::MissingEventName),
        }
        if event.properties.is_none() {
            return Err(ProxyError::MissingProperties);
        }
        self.tokens.validate(event.token())?;
        Ok(())
    }

    /// Fails on the first invalid event, the batch is admitted as a whole or
    /// not at all.
    pub fn assert_valid_batch(&self, events: &[TrackEvent]) -> Result<(), ProxyError> {
        for (index, event) in events.iter().enumerate() {
            self.assert_valid(event).map_err(|err| {
                tracing::debug!(index, "rejecting batch: {}", err);
                err
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{EventValidator, TrackEvent};
    use crate::api::ProxyError;
    use crate::token::{InvalidTokenReason, TokenWhitelist};

    fn validator() -> EventValidator {
        EventValidator::new(TokenWhitelist::new(["validtoken"]))
    }

    fn event(value: serde_json::Value) -> TrackEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn accepts_well_formed_event() {
        let event = event(json!({"event": "sweet", "properties": {"token": "validtoken"}}));

        assert!(validator().assert_valid(&event).is_ok());
    }

    #[test]
    fn requires_event_name() {
        let missing = event(json!({"properties": {"token": "validtoken"}}));
        let empty = event(json!({"event": "", "properties": {"token": "validtoken"}}));

        for event in [missing, empty] {
            let err = validator().assert_valid(&event).unwrap_err();
            assert!(matches!(err, ProxyError::MissingEventName));
            assert_eq!(err.to_string(), "event.event is required");
        }
    }

    #[test]
    fn requires_properties() {
        let err = validator()
            .assert_valid(&event(json!({"event": "sweet"})))
            .unwrap_err();

        assert!(matches!(err, ProxyError::MissingProperties));
        assert_eq!(err.to_string(), "event.properties is required");
    }

    #[test]
    fn requires_whitelisted_string_token() {
        let cases = [
            (json!({}), InvalidTokenReason::IsEmpty),
            (json!({"token": 42}), InvalidTokenReason::IsEmpty),
            (json!({"token": "nope"}), InvalidTokenReason::NotWhitelisted),
        ];

        for (properties, reason) in cases {
            let event = event(json!({"event": "sweet", "properties": properties}));
            match validator().assert_valid(&event) {
                Err(ProxyError::InvalidToken(actual)) => assert_eq!(actual, reason),
                other => panic!("unexpected result {:?}", other),
            }
        }
    }

    #[test]
    fn one_bad_event_fails_the_batch() {
        let batch = vec![
            event(json!({"event": "one", "properties": {"token": "validtoken"}})),
            event(json!({"event": "two", "properties": {}})),
        ];

        assert!(matches!(
            validator().assert_valid_batch(&batch),
            Err(ProxyError::InvalidToken(InvalidTokenReason::IsEmpty))
        ));
    }

    #[test]
    fn keeps_unknown_top_level_fields() {
        let raw = json!({"event": "sweet", "properties": {"token": "t"}, "$set": {"a": 1}});
        let event = event(raw.clone());

        assert_eq!(serde_json::to_value(&event).unwrap(), raw);
    }

    #[test]
    fn null_properties_count_as_absent() {
        let event = event(json!({"event": "sweet", "properties": {"campaign": null, "a": ""}}));

        assert!(!event.has_property("campaign"));
        assert!(event.has_property("a"));
        assert!(!event.has_property("b"));
    }
}
