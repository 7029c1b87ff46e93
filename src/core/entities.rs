//! Character reference decoding
//!
//! Decodes the predefined entities (`&lt;` `&gt;` `&amp;` `&quot;` `&apos;`)
//! and numeric references (`&#123;` `&#x7B;`) in text and attribute values.
//! Borrows the input when it contains no `&`.

use std::borrow::Cow;

use memchr::memchr;

/// Decode references in `input`.
///
/// Unknown named entities and malformed references are kept verbatim; the
/// loader does not read DTDs, so they have no replacement text.
#[inline]
pub fn decode_text(input: &str) -> Cow<'_, str> {
    if memchr(b'&', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }
    Cow::Owned(decode_references(input))
}

fn decode_references(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = memchr(b'&', rest.as_bytes()) {
        result.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let replacement = memchr(b';', rest.as_bytes())
            .and_then(|semi| decode_reference(&rest[1..semi]).map(|c| (c, semi)));
        match replacement {
            Some((c, semi)) => {
                result.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                result.push('&');
                rest = &rest[1..];
            }
        }
    }
    result.push_str(rest);
    result
}

/// Replacement character for the reference between `&` and `;`.
fn decode_reference(reference: &str) -> Option<char> {
    match reference {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let digits = reference.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse::<u32>().ok()?,
            };
            char::from_u32(code).filter(|&c| is_xml_char(c))
        }
    }
}

/// XML 1.0 `Char` production.
#[inline]
fn is_xml_char(c: char) -> bool {
    matches!(c, '\u{9}' | '\u{A}' | '\u{D}' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}
