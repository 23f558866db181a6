//! Built-in Block Protocol data types
//!
//! These always resolve, are never declared locally and are never
//! diffed, planned or published.

use crate::model::{DataType, OntologyType, Primitive, TypeBody};
use crate::url::{BaseUrl, VersionedUrl};
use std::sync::LazyLock;

pub const BLOCKPROTOCOL_DATA_TYPES: &str =
    "https://blockprotocol.org/@blockprotocol/types/data-type/";

static BUILTINS: LazyLock<Vec<OntologyType>> = LazyLock::new(|| {
    Primitive::ALL
        .iter()
        .map(|primitive| OntologyType {
            id: data_type(*primitive).at(1),
            title: primitive.title().to_string(),
            description: None,
            archived: false,
            body: TypeBody::DataType(DataType {
                primitive: *primitive,
            }),
        })
        .collect()
});

/// All built-in data types
pub fn all() -> &'static [OntologyType] {
    &BUILTINS
}

/// Built-in type published under `base`, if any
pub fn find(base: &BaseUrl) -> Option<&'static OntologyType> {
    BUILTINS.iter().find(|t| t.base() == base)
}

pub fn get(url: &VersionedUrl) -> Option<&'static OntologyType> {
    BUILTINS.iter().find(|t| &t.id == url)
}

pub fn is_builtin(base: &BaseUrl) -> bool {
    find(base).is_some()
}

/// Base URL of the built-in data type for `primitive`
pub fn data_type(primitive: Primitive) -> BaseUrl {
    BaseUrl::from_trusted(format!("{BLOCKPROTOCOL_DATA_TYPES}{}/", primitive.slug()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TypeKind;

    #[test]
    fn test_all_primitives_are_builtin() {
        assert_eq!(all().len(), Primitive::ALL.len());
        assert!(all().iter().all(|t| t.kind() == TypeKind::DataType));
        assert!(all().iter().all(|t| t.version() == 1));
    }

    #[test]
    fn test_lookup() {
        let text = data_type(Primitive::Text);
        assert_eq!(
            text.as_str(),
            "https://blockprotocol.org/@blockprotocol/types/data-type/text/"
        );
        assert!(is_builtin(&text));
        assert!(get(&text.at(1)).is_some());
        assert!(get(&text.at(2)).is_none());

        let other = BaseUrl::new("https://example.com/data-type/text/").unwrap();
        assert!(!is_builtin(&other));
    }
}
