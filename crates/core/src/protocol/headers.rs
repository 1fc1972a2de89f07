use crate::error::{ParseErrorKind, Result, RtspError};

/// Ordered message headers with case-insensitive lookup (RFC 2326 §4.2).
///
/// Names are stored as received so a message can be re-serialized without
/// disturbing headers nobody touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `Name: value` lines up to the first empty line.
    pub fn parse<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Self> {
        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or(RtspError::parse(ParseErrorKind::InvalidHeader))?;
            headers.insert(name.trim(), value.trim());
        }
        Ok(headers)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Append a header, keeping any existing one with the same name.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    /// Replace the first header called `name` in place, or append it.
    pub fn set(&mut self, name: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.insert(name, value),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self
            .entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Write every header as `Name: value\r\n`.
    pub fn write_to(&self, out: &mut String) {
        for (name, value) in &self.entries {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let h = Headers::parse("CSeq: 42\r\ncontent-base: rtsp://a/b/\r\n\r\n".lines()).unwrap();
        assert_eq!(h.get("cseq"), Some("42"));
        assert_eq!(h.get("CSEQ"), Some("42"));
        assert_eq!(h.get("Content-Base"), Some("rtsp://a/b/"));
        assert_eq!(h.get("Session"), None);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut h = Headers::new();
        h.insert("CSeq", "1");
        h.insert("Transport", "old");
        h.insert("User-Agent", "x");
        h.set("transport", "new");
        let names: Vec<_> = h.iter().collect();
        assert_eq!(
            names,
            vec![("CSeq", "1"), ("Transport", "new"), ("User-Agent", "x")]
        );
        h.set("Session", "abc");
        assert_eq!(h.get("session"), Some("abc"));
        assert_eq!(h.remove("SESSION"), Some("abc".to_string()));
        assert_eq!(h.get("Session"), None);
    }

    #[test]
    fn missing_colon_is_rejected() {
        assert!(Headers::parse("CSeq 1".lines()).is_err());
    }
}
