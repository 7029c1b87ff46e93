//! Level codes: component encoding and sibling minting.
//!
//! A level code is a non-empty list of `u32` components. Siblings created by
//! appending get a single component (`1`, `2`, `3`, ...). A node inserted
//! between two adjacent siblings gets extra components (`1/1`, `1/0/1`), so
//! existing identifiers never change.
//!
//! Every component is written with an order-preserving prefix-free code and
//! followed by a marker byte:
//!
//! ```text
//! value range                      bytes  first byte
//! 0 .. 0x7F                        1      0x00..0x7F
//! 0x80 .. +2^14                    2      0x80..0xBF
//! .. +2^21                         3      0xC0..0xDF
//! .. +2^28                         4      0xE0..0xEF
//! rest of u32                      5      0xF0
//!
//! marker: 0x01 = more components follow, 0x00 = level ends
//! ```
//!
//! Comparing the encoded bytes therefore compares the component lists
//! lexicographically, with a shorter list sorting first.

use crate::error::{Error, Result};

/// Marker byte written after a component that continues its level.
pub const SUB_LEVEL: u8 = 0x01;

/// Marker byte written after the last component of a level.
pub const LEVEL_END: u8 = 0x00;

const TWO_BYTE_BASE: u32 = 0x80;
const THREE_BYTE_BASE: u32 = TWO_BYTE_BASE + (1 << 14);
const FOUR_BYTE_BASE: u32 = THREE_BYTE_BASE + (1 << 21);
const FIVE_BYTE_BASE: u32 = FOUR_BYTE_BASE + (1 << 28);

/// Append the encoded form of one component.
pub fn encode_component(value: u32, out: &mut Vec<u8>) {
    if value < TWO_BYTE_BASE {
        out.push(value as u8);
    } else if value < THREE_BYTE_BASE {
        let x = value - TWO_BYTE_BASE;
        out.extend_from_slice(&[0x80 | (x >> 8) as u8, x as u8]);
    } else if value < FOUR_BYTE_BASE {
        let x = value - THREE_BYTE_BASE;
        out.extend_from_slice(&[0xC0 | (x >> 16) as u8, (x >> 8) as u8, x as u8]);
    } else if value < FIVE_BYTE_BASE {
        let x = value - FOUR_BYTE_BASE;
        out.extend_from_slice(&[
            0xE0 | (x >> 24) as u8,
            (x >> 16) as u8,
            (x >> 8) as u8,
            x as u8,
        ]);
    } else {
        out.push(0xF0);
        out.extend_from_slice(&value.to_be_bytes());
    }
}

/// Encoded width of a component, from its first byte.
#[inline]
pub fn component_width(first: u8) -> Option<usize> {
    match first {
        0x00..=0x7F => Some(1),
        0x80..=0xBF => Some(2),
        0xC0..=0xDF => Some(3),
        0xE0..=0xEF => Some(4),
        0xF0 => Some(5),
        _ => None,
    }
}

/// Decode the component starting at `pos`, returning it and its width.
pub fn decode_component(data: &[u8], pos: usize) -> Result<(u32, usize)> {
    let first = *data
        .get(pos)
        .ok_or_else(|| Error::malformed_identifier("truncated level code"))?;
    let width = component_width(first).ok_or_else(|| {
        Error::malformed_identifier(format!("invalid component prefix 0x{first:02X}"))
    })?;
    let bytes = data
        .get(pos..pos + width)
        .ok_or_else(|| Error::malformed_identifier("truncated level code"))?;

    let value = match width {
        1 => first as u32,
        2 => TWO_BYTE_BASE + ((((first & 0x3F) as u32) << 8) | bytes[1] as u32),
        3 => {
            THREE_BYTE_BASE
                + ((((first & 0x1F) as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32)
        }
        4 => {
            FOUR_BYTE_BASE
                + ((((first & 0x0F) as u32) << 24)
                    | ((bytes[1] as u32) << 16)
                    | ((bytes[2] as u32) << 8)
                    | bytes[3] as u32)
        }
        _ => {
            let value = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
            if value < FIVE_BYTE_BASE {
                return Err(Error::malformed_identifier("non-canonical level code"));
            }
            value
        }
    };
    Ok((value, width))
}

/// Append a whole level: components with their markers.
pub fn encode_level(components: &[u32], out: &mut Vec<u8>) {
    let last = components.len().saturating_sub(1);
    for (i, &component) in components.iter().enumerate() {
        encode_component(component, out);
        out.push(if i == last { LEVEL_END } else { SUB_LEVEL });
    }
}

/// Decode the level starting at `pos`, returning its components and the
/// position just past its end marker.
pub fn decode_level(data: &[u8], mut pos: usize) -> Result<(Vec<u32>, usize)> {
    let mut components = Vec::with_capacity(1);
    loop {
        let (value, width) = decode_component(data, pos)?;
        components.push(value);
        pos += width;
        match data.get(pos) {
            Some(&LEVEL_END) => return Ok((components, pos + 1)),
            Some(&SUB_LEVEL) => pos += 1,
            Some(&other) => {
                return Err(Error::malformed_identifier(format!(
                    "invalid level marker 0x{other:02X}"
                )))
            }
            None => return Err(Error::malformed_identifier("level code without end marker")),
        }
    }
}

/// Mint a level code strictly between `left` and `right`.
///
/// Returns `None` unless `left < right`. The result never ends in component
/// 0, so a further code can always be minted before it.
pub fn between(left: &[u32], right: &[u32]) -> Option<Vec<u32>> {
    let common = left
        .iter()
        .zip(right)
        .take_while(|(a, b)| a == b)
        .count();

    if common == left.len() {
        // left is a proper prefix of right: descend below right's tail
        if common == right.len() {
            return None;
        }
        let mut code = left.to_vec();
        code.extend(below(&right[common..])?);
        return Some(code);
    }
    if common == right.len() || left[common] > right[common] {
        return None;
    }

    let (l, r) = (left[common], right[common]);
    let mut code = left[..common].to_vec();
    if r - l >= 2 {
        code.push(l + (r - l) / 2);
    } else {
        code.push(l);
        code.extend(above(&left[common + 1..]));
    }
    Some(code)
}

/// Smallest-effort code sorting before `tail` (and after the empty list).
fn below(tail: &[u32]) -> Option<Vec<u32>> {
    match tail.split_first()? {
        (&first, _) if first >= 2 => Some(vec![first - 1]),
        (&1, _) => Some(vec![0, 1]),
        (_, rest) => {
            let mut code = vec![0];
            code.extend(below(rest)?);
            Some(code)
        }
    }
}

/// Code sorting after `tail` within the same prefix.
fn above(tail: &[u32]) -> Vec<u32> {
    match tail.split_first() {
        None => vec![1],
        Some((&first, rest)) => match first.checked_add(1) {
            Some(next) => vec![next],
            None => {
                let mut code = vec![first];
                code.extend(above(rest));
                code
            }
        },
    }
}

/// Code sorting before `code` with no left neighbour.
pub fn before(code: &[u32]) -> Option<Vec<u32>> {
    below(code)
}
