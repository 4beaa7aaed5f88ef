//! Reply text extraction

use regex::Regex;
use std::sync::OnceLock;

fn wrote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)\bOn\s.{1,200}?\bwrote:").expect("static regex"))
}

fn mime_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(content-type|content-transfer-encoding|content-disposition|mime-version|--[-=_a-z0-9]+)")
            .expect("static regex")
    })
}

/// Decode quoted-printable soft line breaks and `=XX` escapes. Invalid
/// escapes are kept verbatim.
pub fn decode_quoted_printable(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'=' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        match bytes.get(i + 1..i + 3) {
            Some([b'\r', b'\n']) => i += 3,
            Some([b'\n', _]) => i += 2,
            None if bytes.get(i + 1) == Some(&b'\n') => i += 2,
            Some(hex_pair) => match std::str::from_utf8(hex_pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
            {
                Some(byte) => {
                    out.push(byte);
                    i += 3;
                }
                None => {
                    out.push(b'=');
                    i += 1;
                }
            },
            None => {
                out.push(b'=');
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Strip quoted history and MIME noise, leaving the new reply text
pub fn extract_reply(body: &str) -> String {
    let decoded = decode_quoted_printable(&body.replace("\r\n", "\n"));

    let head = match wrote_re().find(&decoded) {
        Some(m) => &decoded[..m.start()],
        None => decoded.as_str(),
    };

    head.lines()
        .filter(|line| !line.trim_start().starts_with('>'))
        .filter(|line| !mime_header_re().is_match(line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_quoted_printable() {
        assert_eq!(decode_quoted_printable("caf=C3=A9"), "café");
        assert_eq!(decode_quoted_printable("long=\r\nline"), "longline");
        assert_eq!(decode_quoted_printable("long=\nline"), "longline");
        assert_eq!(decode_quoted_printable("a=3Db"), "a=b");
        assert_eq!(decode_quoted_printable("price =ZZ"), "price =ZZ");
        assert_eq!(decode_quoted_printable("trailing="), "trailing=");
    }

    #[test]
    fn test_cuts_at_attribution_line() {
        let body = "Sounds good, let's talk Tuesday.\n\nOn Mon, Jan 1, 2024 at 9:00 AM Rep <rep@acme.io> wrote:\n> Hi Ada,\n> Are you free?";
        assert_eq!(extract_reply(body), "Sounds good, let's talk Tuesday.");
    }

    #[test]
    fn test_attribution_wrapped_over_lines() {
        let body = "Yes please\nOn Mon, Jan 1, 2024 at 9:00 AM Rep\n<rep@acme.io> wrote:\nold text";
        assert_eq!(extract_reply(body), "Yes please");
    }

    #[test]
    fn test_drops_quoted_and_mime_lines() {
        let body = "Content-Type: text/plain; charset=UTF-8\nContent-Transfer-Encoding: quoted-printable\n\nThanks!\n> quoted\nBest=2C Ada";
        assert_eq!(extract_reply(body), "Thanks!\nBest, Ada");
    }

    #[test]
    fn test_plain_reply_untouched() {
        assert_eq!(extract_reply("  Not interested.  "), "Not interested.");
    }
}
