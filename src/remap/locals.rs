//! Local variable name sanitizing.

use std::collections::HashSet;

use crate::util::basename;

const KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "false", "final", "finally",
    "float", "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "null", "package", "private", "protected", "public", "return", "short",
    "static", "strictfp", "super", "switch", "synchronized", "this", "throw", "throws",
    "transient", "true", "try", "void", "volatile", "while", "_",
];

/// Returns true if `name` is a usable Java identifier.
///
/// `this` is accepted since compilers emit it for slot 0 of instance methods.
pub fn is_valid_local_name(name: &str) -> bool {
    if name == "this" {
        return true;
    }
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        && !KEYWORDS.contains(&name)
}

/// Derives a base variable name from a field descriptor.
pub fn name_for_descriptor(descriptor: &str) -> String {
    let element = descriptor.trim_start_matches('[');
    let dims = descriptor.len() - element.len();

    let mut name = match element.as_bytes().first() {
        Some(b'L') => {
            let class = element.trim_start_matches('L').trim_end_matches(';');
            let simple = basename(class).rsplit('$').next().unwrap_or(class);
            let mut chars = simple.chars();
            match chars.next() {
                Some(first) => first.to_lowercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        Some(b'Z') => "bl".to_string(),
        Some(b'B') => "b".to_string(),
        Some(b'C') => "c".to_string(),
        Some(b'S') => "s".to_string(),
        Some(b'I') => "i".to_string(),
        Some(b'J') => "l".to_string(),
        Some(b'F') => "f".to_string(),
        Some(b'D') => "d".to_string(),
        _ => String::new(),
    };
    if dims > 0 {
        name.push_str("Arr");
    }
    if !is_valid_local_name(&name) {
        name.insert_str(0, "var");
        if !is_valid_local_name(&name) {
            name = "var".to_string();
        }
    }
    name
}

/// Hands out unique replacement names within one method.
#[derive(Debug, Default)]
pub struct LocalNamer {
    taken: HashSet<String>,
}

impl LocalNamer {
    /// Creates a namer that avoids the already valid names of a method.
    pub fn new<'a>(existing: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            taken: existing
                .into_iter()
                .filter(|n| is_valid_local_name(n))
                .map(str::to_string)
                .collect(),
        }
    }

    /// Returns a fresh name for a local of type `descriptor`.
    pub fn fresh(&mut self, descriptor: &str) -> String {
        let base = name_for_descriptor(descriptor);
        let mut candidate = base.clone();
        let mut n = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{base}{n}");
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity() {
        assert!(is_valid_local_name("player"));
        assert!(is_valid_local_name("this"));
        assert!(is_valid_local_name("$x1"));
        assert!(!is_valid_local_name("\u{2603}"));
        assert!(!is_valid_local_name("1st"));
        assert!(!is_valid_local_name("class"));
        assert!(!is_valid_local_name(""));
    }

    #[test]
    fn test_names_from_descriptors() {
        assert_eq!(name_for_descriptor("Lcom/example/ServerLevel;"), "serverLevel");
        assert_eq!(name_for_descriptor("Lcom/example/Outer$Inner;"), "inner");
        assert_eq!(name_for_descriptor("[I"), "iArr");
        assert_eq!(name_for_descriptor("Z"), "bl");
        // Anonymous classes have numeric simple names.
        assert_eq!(name_for_descriptor("Lcom/example/Outer$1;"), "var1");
    }

    #[test]
    fn test_namer_deduplicates() {
        let mut namer = LocalNamer::new(["i", "\u{2603}"]);
        assert_eq!(namer.fresh("I"), "i2");
        assert_eq!(namer.fresh("I"), "i3");
        assert_eq!(namer.fresh("J"), "l");
    }
}
