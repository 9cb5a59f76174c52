//! SASL mechanisms and the construction of Connection.StartOk responses.

use crate::buffer::Buffer;
use crate::codec::FrameWriter;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{AMQPValue, FieldTable, LongString, ShortString};
use crate::uri::AMQPUri;

/// The authentication mechanism announced in Connection.StartOk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SASLMechanism {
    /// The RabbitMQ variant carrying a field table of credentials.
    #[default]
    AMQPLain,
    Plain,
    External,
    Anonymous,
    /// Any other mechanism; the response must be preset by the caller.
    Custom(ShortString),
}

impl SASLMechanism {
    pub fn name(&self) -> &str {
        match self {
            SASLMechanism::AMQPLain => "AMQPLAIN",
            SASLMechanism::Plain => "PLAIN",
            SASLMechanism::External => "EXTERNAL",
            SASLMechanism::Anonymous => "ANONYMOUS",
            SASLMechanism::Custom(name) => name,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub(crate) fn new(username: String, password: String) -> Self {
        Self { username, password }
    }

    /// The initial SASL response for `mechanism`. A `Custom` mechanism uses
    /// the caller-preset `response` verbatim.
    pub(crate) fn sasl_response(
        &self,
        mechanism: &SASLMechanism,
        preset: Option<&LongString>,
    ) -> Result<LongString> {
        match mechanism {
            SASLMechanism::AMQPLain => self.amqplain_response(),
            SASLMechanism::Plain => {
                Ok(format!("\0{}\0{}", self.username, self.password).into_bytes())
            }
            SASLMechanism::External | SASLMechanism::Anonymous => Ok(b"\0".to_vec()),
            SASLMechanism::Custom(name) => preset.cloned().ok_or_else(|| {
                Error::from(ErrorKind::InvalidUri(format!(
                    "mechanism {} requires a preset auth response",
                    name
                )))
            }),
        }
    }

    /// AMQPLAIN: a {LOGIN, PASSWORD} field table, serialized without the
    /// leading size so the long string carries the table body directly.
    fn amqplain_response(&self) -> Result<LongString> {
        let mut table = FieldTable::default();
        table.insert(
            "LOGIN".to_string(),
            AMQPValue::LongString(self.username.clone()),
        );
        table.insert(
            "PASSWORD".to_string(),
            AMQPValue::LongString(self.password.clone()),
        );
        let mut buf = Buffer::with_capacity(64);
        FrameWriter::new(&mut buf).write_table(&table)?;
        buf.consume(4);
        Ok(buf.data().to_vec())
    }
}

impl From<&AMQPUri> for Credentials {
    fn from(uri: &AMQPUri) -> Self {
        Self::new(
            uri.authority.userinfo.username.clone(),
            uri.authority.userinfo.password.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guest() -> Credentials {
        Credentials::new("guest".to_string(), "guest".to_string())
    }

    #[test]
    fn plain_response() {
        let response = guest().sasl_response(&SASLMechanism::Plain, None).unwrap();
        assert_eq!(response, b"\0guest\0guest");
    }

    #[test]
    fn external_and_anonymous_send_a_single_nul() {
        for mechanism in [SASLMechanism::External, SASLMechanism::Anonymous] {
            assert_eq!(guest().sasl_response(&mechanism, None).unwrap(), b"\0");
        }
    }

    #[test]
    fn amqplain_is_a_table_body_without_size_prefix() {
        let response = guest()
            .sasl_response(&SASLMechanism::AMQPLain, None)
            .unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(&[5]);
        expected.extend_from_slice(b"LOGIN");
        expected.push(b'S');
        expected.extend_from_slice(&5u32.to_be_bytes());
        expected.extend_from_slice(b"guest");
        expected.extend_from_slice(&[8]);
        expected.extend_from_slice(b"PASSWORD");
        expected.push(b'S');
        expected.extend_from_slice(&5u32.to_be_bytes());
        expected.extend_from_slice(b"guest");
        assert_eq!(response, expected);
    }

    #[test]
    fn custom_mechanism_uses_the_preset_response() {
        let preset = b"token".to_vec();
        let response = guest()
            .sasl_response(
                &SASLMechanism::Custom("OAUTH2".to_string()),
                Some(&preset),
            )
            .unwrap();
        assert_eq!(response, preset);
        assert!(
            guest()
                .sasl_response(&SASLMechanism::Custom("OAUTH2".to_string()), None)
                .is_err()
        );
    }
}
