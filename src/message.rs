use crate::error::Result;
use crate::protocol::BasicProperties;
use crate::types::{DeliveryTag, ShortString};
use serde::Serialize;

/// A message delivered to a consumer.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub delivery_tag: DeliveryTag,
    pub consumer_tag: Option<ShortString>,
    pub exchange: ShortString,
    pub routing_key: ShortString,
    pub redelivered: bool,
    pub properties: BasicProperties,
    pub data: Vec<u8>,
}

/// An outbound message body and its encoding rules.
///
/// Raw bytes and text are sent verbatim (UTF-8 for text) with no content
/// type injected; anything else goes through JSON and defaults the content
/// type to `application/json`.
#[derive(Clone, Debug)]
pub enum Payload {
    Bytes(Vec<u8>),
    Text(String),
    Json(serde_json::Value),
}

impl Payload {
    pub fn from_serialize<T: Serialize>(value: &T) -> serde_json::Result<Payload> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    /// Encodes the body and applies the content-type defaults to the
    /// header properties.
    pub(crate) fn into_parts(self, mut properties: BasicProperties) -> Result<(Vec<u8>, BasicProperties)> {
        let body = match self {
            Payload::Bytes(bytes) => {
                if properties == BasicProperties::default() {
                    properties.content_type = Some("application/octet-stream".to_string());
                }
                bytes
            }
            Payload::Text(text) => {
                if properties == BasicProperties::default() {
                    properties.content_type = Some("application/octet-stream".to_string());
                }
                text.into_bytes()
            }
            Payload::Json(value) => {
                if properties.content_type.is_none() {
                    properties.content_type = Some("application/json".to_string());
                }
                serde_json::to_vec(&value)
                    .map_err(|e| crate::error::ErrorKind::IOError(e.into()))?
            }
        };
        Ok((body, properties))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_sent_verbatim_with_default_content_type() {
        let (body, properties) = Payload::from(b"raw".as_slice())
            .into_parts(BasicProperties::default())
            .unwrap();
        assert_eq!(body, b"raw");
        assert_eq!(
            properties.content_type.as_deref(),
            Some("application/octet-stream")
        );
    }

    #[test]
    fn explicit_properties_are_not_overridden() {
        let properties = BasicProperties::default().with_content_type("text/plain".into());
        let (_, properties) = Payload::from("hello").into_parts(properties).unwrap();
        assert_eq!(properties.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn json_values_default_to_application_json() {
        let (body, properties) = Payload::from(serde_json::json!({"n": 1}))
            .into_parts(BasicProperties::default())
            .unwrap();
        assert_eq!(body, br#"{"n":1}"#);
        assert_eq!(properties.content_type.as_deref(), Some("application/json"));
    }
}
