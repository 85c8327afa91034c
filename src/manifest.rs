//! JAR manifest (`META-INF/MANIFEST.MF`) reading and writing.

/// Longest line the manifest format allows, excluding the line break.
const MAX_LINE: usize = 72;

/// One manifest section: the main section or a per-entry `Name:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    /// Attributes in file order
    pub attributes: Vec<(String, String)>,
}

impl Section {
    /// Returns an attribute value. Names compare case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replaces an existing attribute value. Returns false if it is absent.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        match self
            .attributes
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => {
                *v = value;
                true
            }
            None => false,
        }
    }
}

/// A parsed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Main section followed by entry sections
    pub sections: Vec<Section>,
}

impl Manifest {
    /// Parses manifest bytes. Continuation lines are joined; malformed lines are skipped.
    pub fn parse(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        let mut sections = vec![Section::default()];

        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                if sections.last().is_some_and(|s| !s.attributes.is_empty()) {
                    sections.push(Section::default());
                }
                continue;
            }

            let Some(section) = sections.last_mut() else {
                continue;
            };
            if let Some(cont) = line.strip_prefix(' ') {
                if let Some((_, value)) = section.attributes.last_mut() {
                    value.push_str(cont);
                }
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                let value = value.strip_prefix(' ').unwrap_or(value);
                section
                    .attributes
                    .push((name.to_string(), value.to_string()));
            }
        }

        if sections.len() > 1 && sections.last().is_some_and(|s| s.attributes.is_empty()) {
            sections.pop();
        }
        Self { sections }
    }

    /// Returns a main section attribute.
    pub fn main_attribute(&self, name: &str) -> Option<&str> {
        self.sections.first()?.get(name)
    }

    /// Returns the main section.
    pub fn main_mut(&mut self) -> Option<&mut Section> {
        self.sections.first_mut()
    }

    /// Removes every attribute, in every section, for which `drop` returns true.
    ///
    /// Entry sections left with only their `Name` attribute are removed.
    pub fn remove_attributes(&mut self, drop: impl Fn(&str) -> bool) {
        for section in &mut self.sections {
            section.attributes.retain(|(k, _)| !drop(k));
        }
        let mut first = true;
        self.sections.retain(|s| {
            let keep = first
                || !(s.attributes.len() == 1 && s.attributes[0].0.eq_ignore_ascii_case("Name"));
            first = false;
            keep
        });
    }

    /// Serializes the manifest with CRLF line breaks and 72-byte line wrapping.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for section in &self.sections {
            for (name, value) in &section.attributes {
                write_wrapped(&mut out, &format!("{name}: {value}"));
            }
            out.extend_from_slice(b"\r\n");
        }
        out
    }
}

fn write_wrapped(out: &mut Vec<u8>, line: &str) {
    let mut rest = line;
    let mut limit = MAX_LINE;
    let mut first = true;
    while !rest.is_empty() {
        let mut cut = rest.len().min(limit);
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if !first {
            out.push(b' ');
        }
        out.extend_from_slice(rest[..cut].as_bytes());
        out.extend_from_slice(b"\r\n");
        rest = &rest[cut..];
        // Continuation lines spend one byte on the leading space.
        limit = MAX_LINE - 1;
        first = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_main_and_entry_sections() {
        let text = b"Manifest-Version: 1.0\r\nMain-Class: io.papermc.paperclip.Main\r\n\r\n\
Name: a/B.class\r\nSHA-256-Digest: abc\r\n\r\n";
        let manifest = Manifest::parse(text);
        assert_eq!(manifest.sections.len(), 2);
        assert_eq!(
            manifest.main_attribute("main-class"),
            Some("io.papermc.paperclip.Main")
        );
        assert_eq!(manifest.sections[1].get("SHA-256-Digest"), Some("abc"));
    }

    #[test]
    fn test_continuation_lines_round_trip() {
        let long = "x".repeat(150);
        let mut manifest = Manifest::default();
        manifest.sections.push(Section {
            attributes: vec![("Class-Path".into(), long.clone())],
        });

        let bytes = manifest.to_bytes();
        assert!(bytes
            .split(|&b| b == b'\n')
            .all(|line| line.len() <= MAX_LINE + 1));
        assert_eq!(Manifest::parse(&bytes).main_attribute("Class-Path"), Some(&*long));
    }

    #[test]
    fn test_remove_digest_attributes() {
        let text = b"Manifest-Version: 1.0\nSHA-256-Digest-Manifest: x\n\nName: a\nSHA-256-Digest: y\n\nName: b\nSHA-256-Digest: z\nFoo: bar\n";
        let mut manifest = Manifest::parse(text);
        manifest.remove_attributes(|name| name.ends_with("-Digest") || name.contains("-Digest-"));

        assert_eq!(manifest.sections.len(), 2);
        assert_eq!(manifest.sections[0].attributes.len(), 1);
        assert_eq!(manifest.sections[1].get("Foo"), Some("bar"));
    }
}
