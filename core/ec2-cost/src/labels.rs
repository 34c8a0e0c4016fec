//! Label sets and the tag-derived label schema.

use crate::api::Tag;

/// Prefix of the labels that are derived from instance tags.
pub const TAG_LABEL_PREFIX: &str = "aws_tag_";

/// An ordered list of `(name, value)` pairs that identifies a time series.
///
/// A `LabelSet` built by [`LabelSet::with_names`] contains every name of the schema,
/// with an empty value. Setting a label overwrites its value in place, therefore the
/// arity and the order of the labels never depend on which values were available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelSet(Vec<(String, String)>);

impl LabelSet {
    /// Creates a label set where every label of `names` is set to the empty string.
    pub fn with_names<S: AsRef<str>>(names: &[S]) -> Self {
        Self(names.iter().map(|n| (n.as_ref().to_owned(), String::new())).collect())
    }

    /// Sets the value of a label.
    ///
    /// If the label does not exist yet, it is appended at the end.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.0.push((name.to_owned(), value)),
        }
    }

    /// Builder-style version of [`set`](Self::set).
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Copies every label of `other` into `self`, overwriting the existing values.
    pub fn overlay(&mut self, other: &LabelSet) {
        for (name, value) in &other.0 {
            self.set(name, value.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `self` contains exactly the labels `names`, in the same order.
    pub fn matches_names<S: AsRef<str>>(&self, names: &[S]) -> bool {
        self.0.len() == names.len() && self.0.iter().zip(names).all(|((n, _), expected)| n == expected.as_ref())
    }
}

impl From<LabelSet> for Vec<(String, String)> {
    fn from(value: LabelSet) -> Self {
        value.0
    }
}

/// Returns the name of the label that holds the value of the instance tag `key`.
///
/// Every character outside of `[A-Za-z0-9]` is replaced by `_`, the result is lowercased,
/// stripped of its leading and trailing underscores and prefixed by [`TAG_LABEL_PREFIX`].
pub fn tag_label_name(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{TAG_LABEL_PREFIX}{}", sanitized.trim_matches('_'))
}

/// A configured tag key and the label it is exposed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagLabel {
    pub key: String,
    pub label: String,
}

/// The tag-derived part of the label schema, built once at startup.
///
/// Two keys can be sanitized to the same label (e.g. `team` and `Team`). Such collisions
/// are kept: when an instance carries both tags, the key declared last wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSchema {
    tags: Vec<TagLabel>,
    label_names: Vec<String>,
}

impl TagSchema {
    /// Builds the schema from a comma-separated list of tag keys, ex. `Team,Environment`.
    ///
    /// Blank entries are ignored.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags = Vec::new();
        let mut label_names: Vec<String> = Vec::new();
        for key in keys {
            let key = key.as_ref().trim();
            if key.is_empty() {
                continue;
            }
            let label = tag_label_name(key);
            if !label_names.contains(&label) {
                label_names.push(label.clone());
            }
            tags.push(TagLabel {
                key: key.to_owned(),
                label,
            });
        }
        Self { tags, label_names }
    }

    pub fn tags(&self) -> &[TagLabel] {
        &self.tags
    }

    /// The distinct tag-derived label names, in declaration order.
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Appends the tag-derived labels to a list of fixed labels.
    pub fn extend_labels(&self, fixed: &[&str]) -> Vec<String> {
        fixed
            .iter()
            .map(|l| l.to_string())
            .chain(self.label_names.iter().cloned())
            .collect()
    }

    /// Returns the tag-derived labels, all set to the empty string.
    pub fn empty_labels(&self) -> LabelSet {
        LabelSet::with_names(self.label_names.as_slice())
    }

    /// Resolves the tag-derived labels of a resource.
    ///
    /// Every configured label is present in the result: tags that the resource
    /// does not carry are exposed as an empty string.
    pub fn resolve(&self, tags: &[Tag]) -> LabelSet {
        let mut labels = self.empty_labels();
        for tag_label in &self.tags {
            if let Some(tag) = tags.iter().find(|t| t.key == tag_label.key) {
                labels.set(&tag_label.label, tag.value.clone());
            }
        }
        labels
    }
}
