//! Tiny mapping format parser (v1 and v2).
//!
//! Both versions are read into the same [`MappingTable`]: a namespace header
//! plus class rows with nested field/method rows. Member descriptors are kept
//! in the first namespace, as the format stores them.

use tracing::trace;

use crate::error::{Error, Result};

/// A parsed mapping table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    /// Namespace labels in column order
    pub namespaces: Vec<String>,
    /// Class rows in file order
    pub classes: Vec<ClassMapping>,
}

/// One class row and its members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassMapping {
    /// Class name per namespace
    pub names: Vec<String>,
    /// Field rows
    pub fields: Vec<MemberMapping>,
    /// Method rows
    pub methods: Vec<MemberMapping>,
}

/// One field or method row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberMapping {
    /// Descriptor in the first namespace
    pub descriptor: String,
    /// Member name per namespace
    pub names: Vec<String>,
}

impl MappingTable {
    /// Parses Tiny v1 or v2 text, detected from the header.
    pub fn parse(text: &str) -> Result<Self> {
        let header = text
            .lines()
            .next()
            .ok_or_else(|| Error::mappings(1, "empty mappings"))?;

        if header.starts_with("tiny\t2\t") {
            parse_v2(text)
        } else if header.starts_with("v1\t") {
            parse_v1(text)
        } else {
            Err(Error::mappings(1, "unrecognized header"))
        }
    }

    /// Returns the column of a namespace label.
    pub fn namespace_index(&self, namespace: &str) -> Result<usize> {
        self.namespaces
            .iter()
            .position(|ns| ns == namespace)
            .ok_or_else(|| Error::UnknownNamespace {
                namespace: namespace.to_string(),
                available: self.namespaces.join(", "),
            })
    }

    /// Total number of member rows.
    pub fn member_count(&self) -> usize {
        self.classes
            .iter()
            .map(|c| c.fields.len() + c.methods.len())
            .sum()
    }
}

impl ClassMapping {
    /// Returns the name in `ns`, falling back to the first namespace when empty.
    pub fn name(&self, ns: usize) -> &str {
        name_or_first(&self.names, ns)
    }
}

impl MemberMapping {
    /// Returns the name in `ns`, falling back to the first namespace when empty.
    pub fn name(&self, ns: usize) -> &str {
        name_or_first(&self.names, ns)
    }
}

fn name_or_first(names: &[String], ns: usize) -> &str {
    match names.get(ns) {
        Some(name) if !name.is_empty() => name,
        _ => names.first().map(String::as_str).unwrap_or(""),
    }
}

// =============================================================================
// Tiny v2
// =============================================================================

fn parse_v2(text: &str) -> Result<MappingTable> {
    let mut lines = text.lines().enumerate();
    let (_, header) = lines.next().ok_or_else(|| Error::mappings(1, "empty mappings"))?;

    let fields: Vec<&str> = header.split('\t').collect();
    if fields.len() < 5 {
        return Err(Error::mappings(1, "header declares fewer than two namespaces"));
    }
    let namespaces: Vec<String> = fields[3..].iter().map(|s| s.to_string()).collect();
    let ns_count = namespaces.len();

    let mut table = MappingTable {
        namespaces,
        classes: Vec::new(),
    };
    let mut escaped = false;
    let mut in_header = true;

    for (idx, line) in lines {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let depth = line.bytes().take_while(|&b| b == b'\t').count();
        let parts: Vec<&str> = line[depth..].split('\t').collect();

        if in_header && depth == 1 {
            if parts[0] == "escaped-names" {
                escaped = true;
            }
            continue;
        }
        in_header = false;

        match (depth, parts[0]) {
            (0, "c") => {
                let names = read_names(&parts[1..], ns_count, escaped, line_no)?;
                table.classes.push(ClassMapping {
                    names,
                    ..Default::default()
                });
            }
            (1, kind @ ("f" | "m")) => {
                let class = table
                    .classes
                    .last_mut()
                    .ok_or_else(|| Error::mappings(line_no, "member row before any class"))?;
                let descriptor = parts
                    .get(1)
                    .ok_or_else(|| Error::mappings(line_no, "member row without descriptor"))?;
                let member = MemberMapping {
                    descriptor: unescape(descriptor, escaped),
                    names: read_names(&parts[2..], ns_count, escaped, line_no)?,
                };
                if kind == "f" {
                    class.fields.push(member);
                } else {
                    class.methods.push(member);
                }
            }
            // Comments, parameters and local variables carry nothing we remap.
            (1.., _) => {
                trace!(line = line_no, kind = parts[0], "skipping row");
            }
            _ => {
                return Err(Error::mappings(
                    line_no,
                    format!("unexpected row kind '{}'", parts[0]),
                ))
            }
        }
    }

    Ok(table)
}

fn read_names(parts: &[&str], ns_count: usize, escaped: bool, line: usize) -> Result<Vec<String>> {
    if parts.len() < ns_count {
        return Err(Error::mappings(
            line,
            format!("expected {} names, found {}", ns_count, parts.len()),
        ));
    }
    Ok(parts[..ns_count].iter().map(|s| unescape(s, escaped)).collect())
}

/// Undoes Tiny v2 name escaping (`\\`, `\n`, `\r`, `\t`, `\0`).
fn unescape(value: &str, escaped: bool) -> String {
    if !escaped || !value.contains('\\') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

// =============================================================================
// Tiny v1
// =============================================================================

fn parse_v1(text: &str) -> Result<MappingTable> {
    let mut lines = text.lines().enumerate();
    let (_, header) = lines.next().ok_or_else(|| Error::mappings(1, "empty mappings"))?;

    let namespaces: Vec<String> = header.split('\t').skip(1).map(str::to_string).collect();
    if namespaces.len() < 2 {
        return Err(Error::mappings(1, "header declares fewer than two namespaces"));
    }
    let ns_count = namespaces.len();

    let mut table = MappingTable {
        namespaces,
        classes: Vec::new(),
    };
    // Owner name (first namespace) -> row in table.classes
    let mut class_rows: std::collections::HashMap<String, usize> = Default::default();

    for (idx, line) in lines {
        let line_no = idx + 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();

        match parts[0] {
            "CLASS" => {
                let names = read_names(&parts[1..], ns_count, false, line_no)?;
                let row = class_row(&mut table, &mut class_rows, &names[0], ns_count);
                table.classes[row].names = names;
            }
            kind @ ("FIELD" | "METHOD") => {
                if parts.len() < 3 + ns_count {
                    return Err(Error::mappings(line_no, "truncated member row"));
                }
                let owner = parts[1];
                let member = MemberMapping {
                    descriptor: parts[2].to_string(),
                    names: read_names(&parts[3..], ns_count, false, line_no)?,
                };
                let row = class_row(&mut table, &mut class_rows, owner, ns_count);
                if kind == "FIELD" {
                    table.classes[row].fields.push(member);
                } else {
                    table.classes[row].methods.push(member);
                }
            }
            other => {
                return Err(Error::mappings(line_no, format!("unexpected row kind '{other}'")));
            }
        }
    }

    Ok(table)
}

/// Returns the row for `owner`, creating an identity row when the class line is absent.
fn class_row(
    table: &mut MappingTable,
    rows: &mut std::collections::HashMap<String, usize>,
    owner: &str,
    ns_count: usize,
) -> usize {
    if let Some(&row) = rows.get(owner) {
        return row;
    }
    table.classes.push(ClassMapping {
        names: vec![owner.to_string(); ns_count],
        ..Default::default()
    });
    let row = table.classes.len() - 1;
    rows.insert(owner.to_string(), row);
    row
}
