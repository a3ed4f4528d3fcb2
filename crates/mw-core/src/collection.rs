//! Contract between the engine and collection (array / table) storage.

use crate::construction::Construction;
use crate::value::Value;

#[derive(Debug)]
pub enum CollectionElement {
    Construction(Construction),
    Nested(CollectionElements),
}

#[derive(Debug)]
pub enum CollectionElements {
    Array(Vec<CollectionElement>),
    Table(Vec<(String, CollectionElement)>),
}

/// What sits behind a (possibly partial) index path.
#[derive(Debug, Clone, Copy)]
pub enum ElementRef<'a> {
    Construction(&'a Construction),
    Nested(&'a CollectionElements),
}

/// Storage-agnostic view of a collection definition. The engine only ever
/// asks for an element reference, a size, or the list of element
/// constructions; it never looks at the layout.
pub trait CollectionSource: Send + Sync {
    /// Element reference for `indexes`, outermost first. Fewer indexes than
    /// dimensions yield a nested collection.
    fn element_ref(&self, indexes: &[Value]) -> Option<ElementRef<'_>>;

    fn size(&self) -> usize;

    /// Elements in declaration order, with their key for tables.
    fn constructions(&self) -> Vec<(Option<&str>, ElementRef<'_>)>;

    /// Depth of the deepest nesting.
    fn depth(&self) -> usize;
}

impl CollectionElement {
    fn as_ref(&self) -> ElementRef<'_> {
        match self {
            CollectionElement::Construction(c) => ElementRef::Construction(c),
            CollectionElement::Nested(nested) => ElementRef::Nested(nested),
        }
    }
}

impl CollectionElements {
    fn get(&self, index: &Value) -> Option<&CollectionElement> {
        match self {
            CollectionElements::Array(items) => {
                let i = usize::try_from(index.as_int()?).ok()?;
                items.get(i)
            }
            CollectionElements::Table(entries) => {
                let key = match index {
                    Value::Text(key) => key.clone(),
                    other => other.to_string(),
                };
                entries.iter().find(|(k, _)| *k == key).map(|(_, e)| e)
            }
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, CollectionElements::Table(_))
    }
}

impl CollectionSource for CollectionElements {
    fn element_ref(&self, indexes: &[Value]) -> Option<ElementRef<'_>> {
        let Some((first, rest)) = indexes.split_first() else {
            return Some(ElementRef::Nested(self));
        };
        match self.get(first)? {
            CollectionElement::Construction(c) if rest.is_empty() => {
                Some(ElementRef::Construction(c))
            }
            CollectionElement::Construction(_) => None,
            CollectionElement::Nested(nested) => nested.element_ref(rest),
        }
    }

    fn size(&self) -> usize {
        match self {
            CollectionElements::Array(items) => items.len(),
            CollectionElements::Table(entries) => entries.len(),
        }
    }

    fn constructions(&self) -> Vec<(Option<&str>, ElementRef<'_>)> {
        match self {
            CollectionElements::Array(items) => {
                items.iter().map(|item| (None, item.as_ref())).collect()
            }
            CollectionElements::Table(entries) => entries
                .iter()
                .map(|(key, item)| (Some(key.as_str()), item.as_ref()))
                .collect(),
        }
    }

    fn depth(&self) -> usize {
        let nested = |e: &CollectionElement| match e {
            CollectionElement::Construction(_) => 0,
            CollectionElement::Nested(inner) => inner.depth(),
        };
        let deepest = match self {
            CollectionElements::Array(items) => items.iter().map(nested).max(),
            CollectionElements::Table(entries) => entries.iter().map(|(_, e)| nested(e)).max(),
        };
        1 + deepest.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> CollectionElements {
        let row = |a: i64, b: i64| {
            CollectionElement::Nested(CollectionElements::Array(vec![
                CollectionElement::Construction(Construction::literal(a)),
                CollectionElement::Construction(Construction::literal(b)),
            ]))
        };
        CollectionElements::Array(vec![row(1, 2), row(3, 4)])
    }

    #[test]
    fn nested_arrays_report_their_depth() {
        assert_eq!(matrix().depth(), 2);
        assert_eq!(matrix().size(), 2);
    }

    #[test]
    fn partial_indexes_yield_nested_collections() {
        let m = matrix();
        assert!(matches!(
            m.element_ref(&[Value::Int(1)]),
            Some(ElementRef::Nested(_))
        ));
        match m.element_ref(&[Value::Int(1), Value::Int(0)]) {
            Some(ElementRef::Construction(c)) => assert_eq!(c.to_string(), "3"),
            other => panic!("unexpected element {:?}", other),
        }
        assert!(m.element_ref(&[Value::Int(2)]).is_none());
        assert!(m
            .element_ref(&[Value::Int(0), Value::Int(0), Value::Int(0)])
            .is_none());
    }

    #[test]
    fn table_keys_accept_non_text_indexes() {
        let table = CollectionElements::Table(vec![(
            "7".to_string(),
            CollectionElement::Construction(Construction::literal("seven")),
        )]);
        assert!(table.element_ref(&[Value::Int(7)]).is_some());
    }
}
