//! Identifier and setSpec encoding for file-system-safe paths.
//!
//! OAI identifiers and resumption tokens may contain characters that are
//! reserved in URIs and hostile in file names (section 3.1.1.3 of the
//! OAI-PMH specification). A fixed, ordered substitution table maps them
//! to percent escapes. The `%` entry must stay first so that encoding is
//! unambiguous; the decoder scans left to right and fails loudly on any
//! reserved character that is not part of an escape.

use crate::error::{HarvesterError, Result};

/// Ordered substitution table. `%` first, always.
const ENCODINGS: [(char, &str); 10] = [
    ('%', "%25"),
    ('/', "%2F"),
    ('?', "%3F"),
    ('#', "%23"),
    ('=', "%3D"),
    ('&', "%26"),
    (':', "%3A"),
    (';', "%3B"),
    (' ', "%20"),
    ('+', "%2B"),
];

/// Encode an identifier, setSpec or resumption token for use as a file
/// name segment.
///
/// # Examples
/// ```
/// use oai_harvester::encoding::encode;
///
/// assert_eq!(encode("oai:dlese.org:DLESE-000-000-000-001"),
///            "oai%3Adlese.org%3ADLESE-000-000-000-001");
/// assert_eq!(encode("100%"), "100%25");
/// ```
#[must_use]
pub fn encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 10);
    for ch in input.chars() {
        match ENCODINGS.iter().find(|(plain, _)| *plain == ch) {
            Some((_, escaped)) => out.push_str(escaped),
            None => out.push(ch),
        }
    }
    out
}

/// Decode a string previously produced by [`encode`].
///
/// If the input contains an already-decoded reserved character, or a `%`
/// that does not begin one of the table's escapes, the call fails
/// loudly: that is the signature of a double-encoding bug upstream, and
/// silently re-decoding would corrupt the identifier.
pub fn decode(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(ch) = rest.chars().next() {
        if ch == '%' {
            match ENCODINGS
                .iter()
                .find(|(_, escaped)| {
                    rest.len() >= 3
                        && rest.is_char_boundary(3)
                        && rest[..3].eq_ignore_ascii_case(escaped)
                })
            {
                Some((plain, _)) => {
                    out.push(*plain);
                    rest = &rest[3..];
                }
                // A bare '%' means the input was decoded already
                None => {
                    return Err(HarvesterError::DoubleDecoded {
                        input: input.to_string(),
                        found: '%',
                    });
                }
            }
        } else if ENCODINGS.iter().any(|(plain, _)| *plain == ch) {
            return Err(HarvesterError::DoubleDecoded {
                input: input.to_string(),
                found: ch,
            });
        } else {
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }
    Ok(out)
}
