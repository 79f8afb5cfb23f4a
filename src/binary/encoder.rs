//! Encoder for the binary node format.
//! Strings and byte content are written raw (no dictionary tokens).

use super::{token, Node, NodeContent};
use crate::Error;

fn write_list_header(out: &mut Vec<u8>, size: usize) -> Result<(), Error> {
    if size <= u8::MAX as usize {
        out.push(token::LIST_8);
        out.push(size as u8);
    } else if size <= u16::MAX as usize {
        out.push(token::LIST_16);
        out.extend_from_slice(&(size as u16).to_be_bytes());
    } else {
        return Err(Error::Binary(format!("list too long: {size}")));
    }
    Ok(())
}

/// BINARY_8 / BINARY_20 length prefix followed by the raw bytes.
fn write_binary(out: &mut Vec<u8>, data: &[u8]) -> Result<(), Error> {
    let len = data.len();
    if len <= u8::MAX as usize {
        out.push(token::BINARY_8);
        out.push(len as u8);
    } else if len <= 0x0F_FFFF {
        out.push(token::BINARY_20);
        out.extend_from_slice(&[((len >> 16) & 0x0F) as u8, (len >> 8) as u8, len as u8]);
    } else {
        return Err(Error::Binary(format!("binary too long: {len}")));
    }
    out.extend_from_slice(data);
    Ok(())
}

/// Encode a node to the binary format.
pub fn encode_node(node: &Node, out: &mut Vec<u8>) -> Result<(), Error> {
    let has_content = !matches!(node.content, NodeContent::Empty);
    write_list_header(out, 1 + 2 * node.attrs.len() + usize::from(has_content))?;

    write_binary(out, node.tag.as_bytes())?;
    for (k, v) in &node.attrs {
        write_binary(out, k.as_bytes())?;
        write_binary(out, v.as_bytes())?;
    }

    match &node.content {
        NodeContent::Empty => {}
        NodeContent::Bytes(b) => write_binary(out, b)?,
        NodeContent::Nodes(children) => {
            write_list_header(out, children.len())?;
            for child in children {
                encode_node(child, out)?;
            }
        }
    }
    Ok(())
}
