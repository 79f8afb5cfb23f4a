//! Binary protocol nodes.
//! WhatsApp uses a custom binary XML-like node format over the Noise socket.

mod consts;
mod decoder;
mod encoder;
mod token;

pub use consts::{NOISE_START_PATTERN, WA_CONN_HEADER};

use std::collections::HashMap;

/// Attributes on a node.
pub type Attrs = HashMap<String, String>;

/// Frame flag marking a zlib-compressed payload.
const FLAG_COMPRESSED: u8 = 0x02;

/// Content of a node: either child nodes or raw bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum NodeContent {
    #[default]
    Empty,
    Nodes(Vec<Node>),
    Bytes(Vec<u8>),
}

/// A single binary protocol node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    pub tag: String,
    pub attrs: Attrs,
    pub content: NodeContent,
}

impl Node {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Attrs::new(),
            content: NodeContent::Empty,
        }
    }

    pub fn with_attr(mut self, k: impl Into<String>, v: impl Into<String>) -> Self {
        self.attrs.insert(k.into(), v.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.content = NodeContent::Nodes(children);
        self
    }

    pub fn with_content(mut self, bytes: Vec<u8>) -> Self {
        self.content = NodeContent::Bytes(bytes);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn get_child_by_tag(&self, tag: &str) -> Option<&Node> {
        self.get_children().iter().find(|n| n.tag == tag)
    }

    pub fn get_children(&self) -> &[Node] {
        match &self.content {
            NodeContent::Nodes(n) => n,
            _ => &[],
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.content {
            NodeContent::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Encode to binary form.
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        let mut out = Vec::new();
        encoder::encode_node(self, &mut out)?;
        Ok(out)
    }

    /// Decode from binary form.
    pub fn decode(data: &[u8]) -> crate::Result<Self> {
        decoder::decode(data)
    }

    /// Encode with the leading frame flags byte (uncompressed).
    pub fn pack(&self) -> crate::Result<Vec<u8>> {
        let mut out = vec![0u8];
        encoder::encode_node(self, &mut out)?;
        Ok(out)
    }

    /// Decode a decrypted frame payload. Compressed frames yield `None`.
    pub fn unpack(frame: &[u8]) -> crate::Result<Option<Self>> {
        let (&flags, body) = frame
            .split_first()
            .ok_or_else(|| crate::Error::Binary("empty frame".into()))?;
        if flags & FLAG_COMPRESSED != 0 {
            return Ok(None);
        }
        decoder::decode(body).map(Some)
    }
}
