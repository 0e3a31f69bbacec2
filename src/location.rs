use crate::{Error, Result};

/// How a fragment write reaches the location.
///
/// The two modes differ in whether a history entry is created and whether
/// listeners observe a `hashchange` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentWrite {
    /// In-place replacement (`history.replaceState`): no new history entry and
    /// no `hashchange`.
    Replace,
    /// Navigating assignment (`location.hash = ...`): pushes a history entry and
    /// queues `hashchange` when the fragment actually changes.
    Assign,
}

/// Document URL split at the fragment delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Location {
    // Everything before '#': scheme, authority, path, and search.
    base: String,
    // Empty, or '#' followed by the percent-encoded fragment.
    hash: String,
}

impl Location {
    pub(crate) fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let scheme_end = trimmed
            .find(':')
            .ok_or_else(|| Error::Runtime(format!("document url has no scheme: {trimmed}")))?;
        if !is_valid_url_scheme(&trimmed[..scheme_end]) {
            return Err(Error::Runtime(format!(
                "document url has an invalid scheme: {trimmed}"
            )));
        }
        let (base, hash) = match trimmed.find('#') {
            Some(pos) => (&trimmed[..pos], ensure_hash_prefix(&trimmed[pos + 1..])),
            None => (trimmed, String::new()),
        };
        Ok(Self {
            base: base.to_string(),
            hash,
        })
    }

    pub(crate) fn href(&self) -> String {
        format!("{}{}", self.base, self.hash)
    }

    /// `location.hash`: empty or `#` plus the encoded fragment.
    pub(crate) fn hash(&self) -> &str {
        &self.hash
    }

    /// URL for `fragment`, which is given without its leading `#`. An empty
    /// fragment drops the delimiter entirely.
    pub(crate) fn with_fragment(&self, fragment: &str) -> String {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
        self.with_encoded_fragment(&encode_fragment(fragment))
    }

    /// URL for a fragment that is already percent-encoded.
    pub(crate) fn with_encoded_fragment(&self, encoded: &str) -> String {
        if encoded.is_empty() {
            self.base.clone()
        } else {
            format!("{}#{encoded}", self.base)
        }
    }

    pub(crate) fn is_hash_only_change(&self, other: &Location) -> bool {
        self.base == other.base && self.hash != other.hash
    }
}

#[derive(Debug, Clone)]
pub(crate) struct History {
    entries: Vec<String>,
    index: usize,
}

impl History {
    pub(crate) fn new(initial_url: String) -> Self {
        Self {
            entries: vec![initial_url],
            index: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn push(&mut self, url: String) {
        self.entries.truncate(self.index + 1);
        self.entries.push(url);
        self.index = self.entries.len() - 1;
    }

    pub(crate) fn replace_current(&mut self, url: String) {
        self.entries[self.index] = url;
    }

    /// Moves by `delta` and returns the url of the new current entry, or `None`
    /// when the move would leave the list.
    pub(crate) fn go(&mut self, delta: i64) -> Option<&str> {
        let target = (self.index as i64).checked_add(delta)?;
        if delta == 0 || target < 0 || target >= self.entries.len() as i64 {
            return None;
        }
        self.index = target as usize;
        Some(&self.entries[self.index])
    }
}

fn is_valid_url_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphabetic() {
        return false;
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}

fn ensure_hash_prefix(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!("#{value}")
    }
}

/// Percent-encodes the bytes the URL fragment encode set covers. `%` is kept
/// as written, so existing `%XX` escapes pass through.
pub(crate) fn encode_fragment(src: &str) -> String {
    encode_bytes(src, false)
}

/// Encodes an element id for a fragment. `%` is escaped as well, so decoding
/// the result always gives back `id`.
pub(crate) fn encode_id_fragment(id: &str) -> String {
    encode_bytes(id, true)
}

fn encode_bytes(src: &str, escape_percent: bool) -> String {
    let mut out = String::with_capacity(src.len());
    for b in src.bytes() {
        if b <= 0x20
            || b >= 0x7F
            || matches!(b, b'"' | b'<' | b'>' | b'`')
            || (escape_percent && b == b'%')
        {
            out.push('%');
            out.push(to_hex_upper(b >> 4));
            out.push(to_hex_upper(b & 0x0F));
        } else {
            out.push(b as char);
        }
    }
    out
}

/// Decodes `%XX` escapes as UTF-8. Truncated escapes, non-hex digits, and
/// invalid UTF-8 sequences are errors.
pub(crate) fn decode_fragment(src: &str) -> Result<String> {
    let malformed = || Error::MalformedFragment(src.to_string());
    let bytes = src.as_bytes();
    let mut out = String::new();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            let ch = src[i..].chars().next().ok_or_else(malformed)?;
            out.push(ch);
            i += ch.len_utf8();
            continue;
        }

        let first = parse_percent_byte(bytes, i).ok_or_else(malformed)?;
        if first < 0x80 {
            out.push(first as char);
            i += 3;
            continue;
        }

        let len = utf8_sequence_len(first).ok_or_else(malformed)?;
        let mut raw_end = i + 3;
        let mut chunk = Vec::with_capacity(len);
        chunk.push(first);
        for _ in 1..len {
            chunk.push(parse_percent_byte(bytes, raw_end).ok_or_else(malformed)?);
            raw_end += 3;
        }
        let decoded = std::str::from_utf8(&chunk).map_err(|_| malformed())?;
        out.push_str(decoded);
        i = raw_end;
    }

    Ok(out)
}

fn parse_percent_byte(bytes: &[u8], offset: usize) -> Option<u8> {
    if bytes.get(offset) != Some(&b'%') {
        return None;
    }
    let hi = from_hex_digit(*bytes.get(offset + 1)?)?;
    let lo = from_hex_digit(*bytes.get(offset + 2)?)?;
    Some((hi << 4) | lo)
}

fn utf8_sequence_len(first: u8) -> Option<usize> {
    match first {
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

fn from_hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn to_hex_upper(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        10..=15 => (b'A' + (nibble - 10)) as char,
        _ => '?',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_hash_and_clears_empty_delimiter() -> Result<()> {
        let location = Location::parse("https://example.test/book.html?x=1#book1-2")?;
        assert_eq!(location.hash(), "#book1-2");
        assert_eq!(location.href(), "https://example.test/book.html?x=1#book1-2");

        let bare = Location::parse("https://example.test/book.html#")?;
        assert_eq!(bare.hash(), "");
        assert_eq!(bare.href(), "https://example.test/book.html");
        assert_eq!(
            location.with_fragment(""),
            "https://example.test/book.html?x=1"
        );
        Ok(())
    }

    #[test]
    fn parse_rejects_urls_without_scheme() {
        assert!(matches!(
            Location::parse("/book.html"),
            Err(Error::Runtime(_))
        ));
        assert!(matches!(Location::parse("1x:foo"), Err(Error::Runtime(_))));
    }

    #[test]
    fn hash_only_change_ignores_identical_urls() -> Result<()> {
        let a = Location::parse("https://example.test/b.html#one")?;
        let b = Location::parse("https://example.test/b.html#two")?;
        let c = Location::parse("https://example.test/c.html#two")?;
        assert!(a.is_hash_only_change(&b));
        assert!(!a.is_hash_only_change(&a.clone()));
        assert!(!b.is_hash_only_change(&c));
        Ok(())
    }

    #[test]
    fn history_push_truncates_forward_entries() {
        let mut history = History::new("u0".into());
        history.push("u1".into());
        history.push("u2".into());
        assert_eq!(history.go(-2), Some("u0"));
        history.push("u3".into());
        assert_eq!(history.len(), 2);
        assert_eq!(history.index(), 1);
        assert_eq!(history.go(1), None);
        history.replace_current("u4".into());
        assert_eq!(history.go(-1), Some("u0"));
        assert_eq!(history.go(1), Some("u4"));
    }

    #[test]
    fn fragment_codec_handles_utf8_and_rejects_malformed_escapes() -> Result<()> {
        assert_eq!(encode_fragment("第1章"), "%E7%AC%AC1%E7%AB%A0");
        assert_eq!(decode_fragment("%E7%AC%AC1%E7%AB%A0")?, "第1章");
        assert_eq!(decode_fragment("book%31-1")?, "book1-1");
        assert_eq!(encode_fragment("a%20b"), "a%20b");
        assert_eq!(encode_fragment("50%"), "50%");
        for bad in ["%", "%4", "%zz", "%E7%AC", "%C0%80", "%FF"] {
            assert!(
                matches!(decode_fragment(bad), Err(Error::MalformedFragment(_))),
                "{bad} should be rejected"
            );
        }
        Ok(())
    }

    #[test]
    fn id_fragments_escape_percent_and_decode_back() -> Result<()> {
        assert_eq!(encode_id_fragment("50%"), "50%25");
        assert_eq!(encode_id_fragment("a%41"), "a%2541");
        assert_eq!(encode_id_fragment("第1章"), "%E7%AC%AC1%E7%AB%A0");
        for id in ["50%", "a%41", "%", "第1章", "book1-1"] {
            assert_eq!(decode_fragment(&encode_id_fragment(id))?, id);
        }

        let location = Location::parse("https://example.test/book.html#old")?;
        assert_eq!(
            location.with_encoded_fragment("a%2541"),
            "https://example.test/book.html#a%2541"
        );
        assert_eq!(
            location.with_encoded_fragment(""),
            "https://example.test/book.html"
        );
        Ok(())
    }
}
