//! Decoder for the binary node format.
//! Supports raw strings (BINARY_8/BINARY_20) and LIST_8/LIST_16 lists; dictionary
//! tokens are rejected.

use super::{token, Attrs, Node, NodeContent};
use crate::Error;

/// Decode one node from `data`.
pub fn decode(data: &[u8]) -> crate::Result<Node> {
    Decoder { data, pos: 0 }.read_node()
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn take(&mut self, len: usize) -> crate::Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::Binary("unexpected eof".into()))?;
        let data = self.data;
        let out = &data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_u8(&mut self) -> crate::Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_list_size(&mut self, list_tag: u8) -> crate::Result<usize> {
        match list_tag {
            token::LIST_EMPTY => Ok(0),
            token::LIST_8 => Ok(self.read_u8()? as usize),
            token::LIST_16 => {
                let b = self.take(2)?;
                Ok(u16::from_be_bytes([b[0], b[1]]) as usize)
            }
            other => Err(Error::Binary(format!("unsupported list token {other}"))),
        }
    }

    /// Body of a BINARY_8/BINARY_20 value whose token was already read.
    fn read_binary(&mut self, tag: u8) -> crate::Result<&'a [u8]> {
        let len = match tag {
            token::BINARY_8 => self.read_u8()? as usize,
            token::BINARY_20 => {
                let b = self.take(3)?;
                ((b[0] as usize & 0x0F) << 16) | ((b[1] as usize) << 8) | (b[2] as usize)
            }
            other => return Err(Error::Binary(format!("unsupported binary token {other}"))),
        };
        self.take(len)
    }

    fn read_string(&mut self) -> crate::Result<String> {
        let tag = self.read_u8()?;
        if tag == token::LIST_EMPTY {
            return Ok(String::new());
        }
        let raw = self.read_binary(tag)?;
        String::from_utf8(raw.to_vec()).map_err(|e| Error::Binary(e.to_string()))
    }

    fn read_node(&mut self) -> crate::Result<Node> {
        let list_tag = self.read_u8()?;
        let list_size = self.read_list_size(list_tag)?;
        if list_size == 0 {
            return Err(Error::Binary("empty list size for node".into()));
        }
        let tag = self.read_string()?;

        let mut attrs = Attrs::new();
        for _ in 0..(list_size - 1) / 2 {
            let k = self.read_string()?;
            let v = self.read_string()?;
            attrs.insert(k, v);
        }

        let content = if list_size % 2 == 0 {
            self.read_content()?
        } else {
            NodeContent::Empty
        };
        Ok(Node {
            tag,
            attrs,
            content,
        })
    }

    fn read_content(&mut self) -> crate::Result<NodeContent> {
        let tag = self.read_u8()?;
        match tag {
            token::LIST_EMPTY => Ok(NodeContent::Empty),
            token::BINARY_8 | token::BINARY_20 => {
                Ok(NodeContent::Bytes(self.read_binary(tag)?.to_vec()))
            }
            token::LIST_8 | token::LIST_16 => {
                let n = self.read_list_size(tag)?;
                let children = (0..n)
                    .map(|_| self.read_node())
                    .collect::<crate::Result<Vec<_>>>()?;
                Ok(NodeContent::Nodes(children))
            }
            other => Err(Error::Binary(format!("unsupported content token {other}"))),
        }
    }
}
