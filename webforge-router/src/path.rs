use serde::de::value::MapDeserializer;

/// The parameters bound by a matched [`Pattern`](crate::Pattern): one entry
/// per `:name` or `*name` segment, in the order they appear in the pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        PathParams(pairs)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the raw string value bound to `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Deserializes the bound parameters into `U`, matching struct fields by
    /// parameter name. Used to implement the `path` tag of the binding
    /// contract.
    pub fn load<'de, U>(&'de self) -> Result<U, serde::de::value::Error>
    where
        U: serde::Deserialize<'de>,
    {
        let iter = self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()));
        U::deserialize(MapDeserializer::new(iter))
    }
}

impl<'a> IntoIterator for &'a PathParams {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Ids {
        category: String,
        id: u32,
    }

    #[test]
    fn loads_into_typed_struct() {
        let params = PathParams::new(vec![
            ("category".to_owned(), "rust".to_owned()),
            ("id".to_owned(), "42".to_owned()),
        ]);
        let ids: Ids = params.load().unwrap();
        assert_eq!(
            ids,
            Ids {
                category: "rust".to_owned(),
                id: 42
            }
        );
    }

    #[test]
    fn get_by_name() {
        let params = PathParams::new(vec![("id".to_owned(), "7".to_owned())]);
        assert_eq!(params.get("id"), Some("7"));
        assert_eq!(params.get("missing"), None);
    }
}
