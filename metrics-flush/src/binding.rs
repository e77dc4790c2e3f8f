use std::collections::BTreeMap;

use metrics_registry::Registry;

/// Tags attached to a binding.
pub type Tags = BTreeMap<String, String>;

/// A registry bound to a metric-group name and a set of tags.
///
/// Bindings are identified by [`binding_id`]: two bindings with the same name but different tags
/// are distinct.
#[derive(Clone, Debug)]
pub struct Binding {
    name: String,
    registry: Registry,
    tags: Tags,
}

impl Binding {
    /// Creates a new `Binding`.
    pub fn new(name: impl Into<String>, registry: Registry, tags: Tags) -> Self {
        Self { name: name.into(), registry, tags }
    }

    /// Metric-group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Identifier of this binding.
    pub fn id(&self) -> String {
        binding_id(&self.name, &self.tags)
    }
}

/// Computes the identifier of the binding with the given name and tags.
///
/// Tags are sorted before rendering, so the identifier does not depend on the order in which they
/// are given: `binding_id("test", [("c", "d"), ("a", "b")])` is `test[a=b,c=d]`.
pub fn binding_id<'a, I, K, V>(name: &str, tags: I) -> String
where
    I: IntoIterator<Item = (&'a K, &'a V)>,
    K: AsRef<str> + ?Sized + 'a,
    V: AsRef<str> + ?Sized + 'a,
{
    let mut pairs: Vec<(&str, &str)> =
        tags.into_iter().map(|(k, v)| (k.as_ref(), v.as_ref())).collect();
    pairs.sort_unstable();

    let mut id = String::with_capacity(name.len() + 2 + pairs.len() * 8);
    id.push_str(name);
    id.push('[');
    for (i, (key, value)) in pairs.into_iter().enumerate() {
        if i > 0 {
            id.push(',');
        }
        id.push_str(key);
        id.push('=');
        id.push_str(value);
    }
    id.push(']');
    id
}

/// Extracts the metric-group name from a binding identifier.
///
/// Strings without tags are returned as is.
pub fn binding_name(id: &str) -> &str {
    match id.find('[') {
        Some(idx) => &id[..idx],
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use proptest::{collection::vec, prelude::*};

    use super::{binding_id, binding_name};

    #[test]
    fn literal_ids() {
        let tags = BTreeMap::from([("a", "b"), ("c", "d")]);
        assert_eq!(binding_id("test", &tags), "test[a=b,c=d]");

        let reversed = [("c".to_string(), "d".to_string()), ("a".to_string(), "b".to_string())];
        assert_eq!(binding_id("test", reversed.iter().map(|(k, v)| (k, v))), "test[a=b,c=d]");

        let empty: HashMap<String, String> = HashMap::new();
        assert_eq!(binding_id("test", &empty), "test[]");
    }

    #[test]
    fn names_from_ids() {
        assert_eq!(binding_name("test[a=b,c=d]"), "test");
        assert_eq!(binding_name("test[]"), "test");
        assert_eq!(binding_name("test"), "test");
    }

    proptest! {
        #[test]
        fn id_does_not_depend_on_tag_order(
            name in "[a-z]{1,8}",
            mut pairs in vec(("[a-z]{1,4}", "[a-z0-9]{0,4}"), 0..8),
        ) {
            let forward = binding_id(&name, pairs.iter().map(|(k, v)| (k, v)));
            pairs.reverse();
            let backward = binding_id(&name, pairs.iter().map(|(k, v)| (k, v)));
            prop_assert_eq!(&forward, &backward);
            prop_assert_eq!(binding_name(&forward), name.as_str());
        }
    }
}
