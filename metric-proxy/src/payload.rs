//! Builds what we forward to mixpanel `/track` out of an inbound request.
//!
//! For a single event the precedence of attribution values is, highest first:
//! the query string, then the event's own properties, then the values restored
//! from the `metricProxy` cookie.

use std::collections::HashMap;
use std::sync::Arc;

use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use tracing::instrument;

use crate::api::ProxyError;
use crate::codec;
use crate::cookies::{AttributionParams, AttributionStore};
use crate::event::{EventBatch, EventFormData, EventValidator, TrackEvent};
use crate::properties::PropertyWhitelist;

/// `/track` supports other params but we only forward `img` and `verbose`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackQuery {
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackBody {
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<String>,
    #[serde(skip)]
    pub events: usize,
}

pub struct PayloadBuilder {
    validator: EventValidator,
    whitelist: Option<PropertyWhitelist>,
    attribution: Arc<AttributionStore>,
}

impl PayloadBuilder {
    /// `whitelist` is `None` when property filtering is disabled.
    pub fn new(
        validator: EventValidator,
        whitelist: Option<PropertyWhitelist>,
        attribution: Arc<AttributionStore>,
    ) -> Self {
        PayloadBuilder {
            validator,
            whitelist,
            attribution,
        }
    }

    /// GET `/track`: one event in the `data` query parameter.
    #[instrument(skip_all)]
    pub fn build_query_payload(
        &self,
        query: &HashMap<String, String>,
        jar: &CookieJar,
    ) -> Result<TrackQuery, ProxyError> {
        let data = non_empty(query.get("data")).ok_or(ProxyError::MissingPayload)?;

        let mut event: TrackEvent = codec::decode(data)?;
        tracing::debug!(event = ?event, "-> query data");
        self.validator.assert_valid(&event)?;

        let properties = event.properties_mut();
        for (key, value) in self.attribution.select(query) {
            properties.insert(key, value.into());
        }

        let restored = self.attribution.restore(jar);
        apply_restored(&mut event, &restored);
        self.filter(&mut event);

        let passthrough = |name: &str| non_empty(query.get(name)).map(String::from);
        Ok(TrackQuery {
            data: codec::encode(&event)?,
            img: passthrough("img"),
            verbose: passthrough("verbose"),
        })
    }

    /// POST `/track`: a batch of events in the `data` form field.
    #[instrument(skip_all, fields(batch_size))]
    pub fn build_body_payload(
        &self,
        form: &EventFormData,
        jar: &CookieJar,
    ) -> Result<TrackBody, ProxyError> {
        let data = non_empty(form.data.as_ref()).ok_or(ProxyError::MissingPayload)?;

        let mut events: EventBatch = codec::decode(data)?;
        tracing::Span::current().record("batch_size", events.len());
        tracing::debug!(events = ?events, "-> body data");
        self.validator.assert_valid_batch(&events)?;

        let restored = self.attribution.restore(jar);
        for event in events.iter_mut() {
            apply_restored(event, &restored);
            self.filter(event);
        }

        Ok(TrackBody {
            data: codec::encode(&events)?,
            verbose: non_empty(form.verbose.as_ref()).map(String::from),
            events: events.len(),
        })
    }

    fn filter(&self, event: &mut TrackEvent) {
        if let (Some(whitelist), Some(properties)) = (&self.whitelist, &mut event.properties) {
            *properties = whitelist.filter(properties);
        }
    }
}

/// Cookie values never overwrite a property the event already carries.
fn apply_restored(event: &mut TrackEvent, restored: &AttributionParams) {
    for (key, value) in restored {
        if event.has_property(key) {
            continue;
        }
        event
            .properties_mut()
            .insert(key.clone(), value.clone().into());
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|value| !value.is_empty())
}
