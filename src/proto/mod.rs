//! Subset of the WhatsApp `Message` protobuf carried inside `plaintext` nodes.
//!
//! Field numbers match the upstream schema so payloads stay wire compatible;
//! unknown fields are skipped by prost on decode.

/// Message content. Only the text-bearing variants are modelled.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Message {
    #[prost(string, optional, tag = "1")]
    pub conversation: Option<String>,
    #[prost(message, optional, tag = "3")]
    pub image_message: Option<ImageMessage>,
    #[prost(message, optional, tag = "6")]
    pub extended_text_message: Option<ExtendedTextMessage>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ExtendedTextMessage {
    #[prost(string, optional, tag = "1")]
    pub text: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ImageMessage {
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub mimetype: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub caption: Option<String>,
}

impl Message {
    /// Plain conversation text.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            conversation: Some(body.into()),
            ..Default::default()
        }
    }

    /// Text body: `conversation`, then `extendedTextMessage.text`, else empty.
    /// Empty strings fall through to the next variant.
    pub fn body_text(&self) -> &str {
        self.conversation
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| {
                self.extended_text_message
                    .as_ref()
                    .and_then(|m| m.text.as_deref())
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or("")
    }
}
