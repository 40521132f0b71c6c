//! LDIF encoding and decoding.
//!
//! The fixture talks to the OpenLDAP command-line tools exclusively through
//! LDIF (RFC 2849), so the codec has to be exact in both directions:
//!
//! - [`encode`] always produces the same text for the same [`Snapshot`]:
//!   entries sorted by DN length then DN (parents before children), attributes
//!   sorted by name, values in insertion order.
//! - [`decode`] accepts everything [`encode`] produces, plus the output of
//!   `ldapsearch -LLL` (folded lines, comments, CRLF line endings).
//!
//! ```
//! use ldap_fixture_core::ldif::{decode, encode};
//! use ldap_fixture_core::{Entry, Snapshot};
//!
//! let snapshot = Snapshot::new().with_entry(
//!     "ou=people,dc=example,dc=org",
//!     Entry::new()
//!         .with_value("objectClass", "organizationalUnit")
//!         .with_value("ou", "people"),
//! );
//! let text = encode(&snapshot).unwrap();
//! assert!(text.starts_with("version: 1\n\n"));
//! assert_eq!(decode(&text).unwrap(), snapshot);
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Attribute holding the entry's distinguished name in LDIF text.
const DN_ATTRIBUTE: &str = "dn";
const VERSION_LINE: &str = "version: 1";

/// Attribute values of a single directory entry.
///
/// Attribute names are kept sorted so that output is deterministic; values keep
/// the order in which they were added. Attributes never hold an empty value
/// list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    attributes: BTreeMap<String, Vec<Vec<u8>>>,
}

impl Entry {
    /// Creates an entry without attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value and returns the entry, for fluent construction.
    #[must_use]
    pub fn with_value(mut self, attribute: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.push(attribute, value);
        self
    }

    /// Appends a value to an attribute, creating the attribute if needed.
    pub fn push(&mut self, attribute: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.attributes
            .entry(attribute.into())
            .or_default()
            .push(value.into());
    }

    /// Replaces all values of an attribute. An empty list removes the attribute.
    pub fn set<I, V>(&mut self, attribute: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        let attribute = attribute.into();
        let values: Vec<Vec<u8>> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.attributes.remove(&attribute);
        } else {
            self.attributes.insert(attribute, values);
        }
    }

    /// Values of an attribute, if present.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&[Vec<u8>]> {
        self.attributes.get(attribute).map(Vec::as_slice)
    }

    /// First value of an attribute, as text, if present and valid UTF-8.
    #[must_use]
    pub fn first_str(&self, attribute: &str) -> Option<&str> {
        self.get(attribute)
            .and_then(<[Vec<u8>]>::first)
            .and_then(|value| std::str::from_utf8(value).ok())
    }

    /// Iterates attributes in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<Vec<u8>>> {
        self.attributes.iter()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true if the entry has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl<'a> IntoIterator for &'a Entry {
    type Item = (&'a String, &'a Vec<Vec<u8>>);
    type IntoIter = btree_map::Iter<'a, String, Vec<Vec<u8>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.iter()
    }
}

/// A set of entries keyed by distinguished name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<String, Entry>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry and returns the snapshot, for fluent construction.
    #[must_use]
    pub fn with_entry(mut self, dn: impl Into<String>, entry: Entry) -> Self {
        self.insert(dn, entry);
        self
    }

    /// Inserts an entry, returning the entry previously stored under the DN.
    pub fn insert(&mut self, dn: impl Into<String>, entry: Entry) -> Option<Entry> {
        self.entries.insert(dn.into(), entry)
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, dn: &str) -> Option<&Entry> {
        self.entries.get(dn)
    }

    /// Returns true if the snapshot holds an entry for the DN.
    #[must_use]
    pub fn contains(&self, dn: &str) -> bool {
        self.entries.contains_key(dn)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in lexicographic DN order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Entry> {
        self.entries.iter()
    }

    /// Rewrites every DN with `f`, keeping the entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LdifFormat`] if two DNs are rewritten to the same one.
    pub fn map_dns(self, mut f: impl FnMut(&str) -> String) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (dn, entry) in self.entries {
            let mapped = f(&dn);
            if entries.contains_key(&mapped) {
                return Err(Error::LdifFormat(format!(
                    "`{dn}` names the same entry as another DN: `{mapped}`"
                )));
            }
            entries.insert(mapped, entry);
        }
        Ok(Self { entries })
    }

    /// Entries in store insertion order: shorter DNs first, ties broken by DN.
    ///
    /// A parent's DN is a proper suffix of each child's DN, so this order
    /// always inserts parents before their children.
    #[must_use]
    pub fn insertion_order(&self) -> Vec<(&str, &Entry)> {
        let mut ordered: Vec<(&str, &Entry)> = self
            .entries
            .iter()
            .map(|(dn, entry)| (dn.as_str(), entry))
            .collect();
        ordered.sort_by(|(a, _), (b, _)| dn_order_key(a).cmp(&dn_order_key(b)));
        ordered
    }

    /// DNs in store deletion order (children before parents).
    #[must_use]
    pub fn deletion_order(&self) -> Vec<String> {
        let mut dns: Vec<String> = self.entries.keys().cloned().collect();
        sort_for_deletion(&mut dns);
        dns
    }
}

impl IntoIterator for Snapshot {
    type Item = (String, Entry);
    type IntoIter = btree_map::IntoIter<String, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a String, &'a Entry);
    type IntoIter = btree_map::Iter<'a, String, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(String, Entry)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (String, Entry)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

fn dn_order_key(dn: &str) -> (usize, &str) {
    (dn.chars().count(), dn)
}

/// Sorts DNs so that every child comes before its parent.
pub fn sort_for_deletion(dns: &mut [String]) {
    dns.sort_by(|a, b| dn_order_key(b).cmp(&dn_order_key(a)));
}

/// Returns true if `value` can be written as-is after `name: `.
///
/// Allowed bytes are 0x14..=0x7F except space, `<` and `:`. Everything else,
/// including any non-ASCII byte, forces base64.
#[must_use]
pub fn is_safe_value(value: &[u8]) -> bool {
    value
        .iter()
        .all(|&byte| (0x14..=0x7f).contains(&byte) && !matches!(byte, b' ' | b'<' | b':'))
}

/// Encodes one `name: value` or `name:: base64` line.
#[must_use]
pub fn encode_line(attribute: &str, value: &[u8]) -> String {
    if is_safe_value(value) {
        // Safe values are pure ASCII.
        format!("{attribute}: {}", String::from_utf8_lossy(value))
    } else {
        format!("{attribute}:: {}", BASE64.encode(value))
    }
}

/// Returns true if `name` can stand left of the colon in an LDIF line.
///
/// Letters, digits, `-`, `;`, `.` and `_` are accepted, covering options
/// (`cn;lang-en`) and numeric OIDs.
#[must_use]
pub fn is_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | ';' | '.' | '_'))
}

/// Serializes a snapshot to LDIF text.
///
/// # Errors
///
/// Returns [`Error::LdifFormat`] if an attribute name could not be read back:
/// one outside [`is_attribute_name`], or `dn` in any letter case.
pub fn encode(snapshot: &Snapshot) -> Result<String> {
    let mut lines = vec![VERSION_LINE.to_string(), String::new()];
    for (dn, entry) in snapshot.insertion_order() {
        lines.push(encode_line(DN_ATTRIBUTE, dn.as_bytes()));
        for (attribute, values) in entry {
            if !is_attribute_name(attribute) || attribute.eq_ignore_ascii_case(DN_ATTRIBUTE) {
                return Err(Error::LdifFormat(format!(
                    "invalid attribute name {attribute:?} in `{dn}`"
                )));
            }
            lines.extend(values.iter().map(|value| encode_line(attribute, value)));
        }
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}

/// Parses LDIF text into a snapshot.
///
/// # Errors
///
/// Returns [`Error::LdifFormat`] when the text is not ASCII, declares a version
/// other than 1, contains a line that is not `name: value` / `name:: base64`,
/// or an entry without exactly one DN.
pub fn decode(text: impl AsRef<[u8]>) -> Result<Snapshot> {
    let bytes = text.as_ref();
    if !bytes.is_ascii() {
        return Err(Error::LdifFormat(
            "LDIF text must be ASCII; use base64 for other values".to_string(),
        ));
    }
    let text = String::from_utf8_lossy(bytes).replace("\r\n", "\n");

    let mut snapshot = Snapshot::new();
    let mut leading = true;
    for block in text.split("\n\n") {
        let lines = logical_lines(block)?;
        let mut lines = lines.as_slice();
        if lines.is_empty() {
            continue;
        }

        if std::mem::take(&mut leading) && lines[0].starts_with("version:") {
            check_version(&lines[0])?;
            lines = &lines[1..];
            if lines.is_empty() {
                continue;
            }
        }

        let (dn, entry) = decode_entry(lines)?;
        if snapshot.contains(&dn) {
            return Err(Error::LdifFormat(format!("duplicate entry for `{dn}`")));
        }
        snapshot.insert(dn, entry);
    }
    Ok(snapshot)
}

/// Joins folded lines and drops comments.
fn logical_lines(block: &str) -> Result<Vec<String>> {
    let mut lines: Vec<String> = Vec::new();
    let mut in_comment = false;
    for raw in block.split('\n') {
        if raw.is_empty() {
            continue;
        }
        if let Some(continuation) = raw.strip_prefix(' ') {
            if in_comment {
                continue;
            }
            let last = lines.last_mut().ok_or_else(|| {
                Error::LdifFormat(format!("continuation line without a preceding line: {raw:?}"))
            })?;
            last.push_str(continuation);
            continue;
        }
        in_comment = raw.starts_with('#');
        if !in_comment {
            lines.push(raw.to_string());
        }
    }
    Ok(lines)
}

fn check_version(line: &str) -> Result<()> {
    let version = line.trim_start_matches("version:").trim();
    if version == "1" {
        Ok(())
    } else {
        Err(Error::LdifFormat(format!(
            "unsupported LDIF version `{version}`, expected `{VERSION_LINE}`"
        )))
    }
}

fn decode_entry(lines: &[String]) -> Result<(String, Entry)> {
    let mut entry = Entry::new();
    let mut dns = Vec::new();
    for line in lines {
        let (attribute, value) = decode_line(line)?;
        if attribute.eq_ignore_ascii_case(DN_ATTRIBUTE) {
            dns.push(value);
        } else {
            entry.push(attribute, value);
        }
    }

    match dns.len() {
        1 => {
            let dn = String::from_utf8(dns.remove(0))
                .map_err(|_| Error::LdifFormat("DN is not valid UTF-8".to_string()))?;
            Ok((dn, entry))
        }
        0 => Err(Error::LdifFormat(format!(
            "entry without a DN: {:?}",
            lines.first().map_or("", String::as_str)
        ))),
        n => Err(Error::LdifFormat(format!("entry has {n} DN lines"))),
    }
}

fn decode_line(line: &str) -> Result<(&str, Vec<u8>)> {
    let invalid = || Error::LdifFormat(format!("invalid line: {line:?}"));

    let (attribute, rest) = line.split_once(':').ok_or_else(invalid)?;
    if !is_attribute_name(attribute) {
        return Err(invalid());
    }

    if let Some(encoded) = rest.strip_prefix(':') {
        let value = BASE64.decode(encoded.trim_matches(' '))?;
        return Ok((attribute, value));
    }
    if rest.starts_with('<') {
        return Err(Error::LdifFormat(format!(
            "URL values are not supported: {line:?}"
        )));
    }
    if !rest.is_empty() && !rest.starts_with(' ') {
        return Err(invalid());
    }
    Ok((attribute, rest.trim_start_matches(' ').as_bytes().to_vec()))
}
