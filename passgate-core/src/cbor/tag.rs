//! Semantic tag handlers (major type 6).
//!
//! The decoder resolves every tag through a [`TagRegistry`]; a tag number
//! without a registered handler is a decode error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{CborError, CborValue};

/// Builds the value for a tag from its already-decoded content.
pub trait TagHandler: Send + Sync {
    fn create(&self, tag: u64, content: CborValue) -> Result<CborValue, CborError>;
}

impl<F> TagHandler for F
where
    F: Fn(u64, CborValue) -> Result<CborValue, CborError> + Send + Sync,
{
    fn create(&self, tag: u64, content: CborValue) -> Result<CborValue, CborError> {
        self(tag, content)
    }
}

/// Keeps the tag wrapper and checks the content has the expected shape.
struct ContentTag {
    expects: &'static str,
    accepts: fn(&CborValue) -> bool,
}

impl TagHandler for ContentTag {
    fn create(&self, tag: u64, content: CborValue) -> Result<CborValue, CborError> {
        if (self.accepts)(&content) {
            Ok(CborValue::Tag(tag, Box::new(content)))
        } else {
            Err(CborError::InvalidTagContent {
                tag,
                reason: format!("expected {}, got {}", self.expects, content.type_name()),
            })
        }
    }
}

fn is_text(v: &CborValue) -> bool {
    matches!(v, CborValue::Text(_))
}

fn is_bytes(v: &CborValue) -> bool {
    matches!(v, CborValue::Bytes(_))
}

fn is_number(v: &CborValue) -> bool {
    v.as_integer().is_some() || matches!(v, CborValue::Other(super::OtherValue::Float(_)))
}

/// `[exponent, mantissa]` with integer exponent and integer or bignum mantissa.
fn is_exponent_pair(v: &CborValue) -> bool {
    match v.as_array() {
        Some([exp, mantissa]) => {
            exp.as_integer().is_some()
                && (mantissa.as_integer().is_some()
                    || matches!(mantissa, CborValue::Tag(2 | 3, _)))
        }
        _ => false,
    }
}

fn is_anything(_: &CborValue) -> bool {
    true
}

#[derive(Clone, Default)]
pub struct TagRegistry {
    handlers: HashMap<u64, Arc<dyn TagHandler>>,
}

impl TagRegistry {
    /// A registry that rejects every tag.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Handlers for the standard tags a WebAuthn payload may carry.
    pub fn with_defaults() -> Self {
        let rules: [(u64, &'static str, fn(&CborValue) -> bool); 15] = [
            (0, "date/time text", is_text),
            (1, "epoch number", is_number),
            (2, "byte string", is_bytes),
            (3, "byte string", is_bytes),
            (4, "[exponent, mantissa]", is_exponent_pair),
            (5, "[exponent, mantissa]", is_exponent_pair),
            (21, "any", is_anything),
            (22, "any", is_anything),
            (23, "any", is_anything),
            (24, "byte string", is_bytes),
            (32, "URI text", is_text),
            (33, "base64url text", is_text),
            (34, "base64 text", is_text),
            (36, "MIME text", is_text),
            (55799, "any", is_anything),
        ];

        let mut registry = Self::empty();
        for (tag, expects, accepts) in rules {
            registry.register(tag, ContentTag { expects, accepts });
        }
        registry
    }

    pub fn register(&mut self, tag: u64, handler: impl TagHandler + 'static) {
        self.handlers.insert(tag, Arc::new(handler));
    }

    pub fn with(mut self, tag: u64, handler: impl TagHandler + 'static) -> Self {
        self.register(tag, handler);
        self
    }

    pub fn contains(&self, tag: u64) -> bool {
        self.handlers.contains_key(&tag)
    }

    pub fn create(&self, tag: u64, content: CborValue) -> Result<CborValue, CborError> {
        let handler = self
            .handlers
            .get(&tag)
            .ok_or(CborError::UnknownTag(tag))?;
        handler.create(tag, content)
    }
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.handlers.keys().collect();
        tags.sort();
        f.debug_struct("TagRegistry").field("tags", &tags).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tags_validate_content() {
        let registry = TagRegistry::with_defaults();
        let ok = registry
            .create(32, CborValue::text("https://example.com"))
            .unwrap();
        assert_eq!(
            ok,
            CborValue::Tag(32, Box::new(CborValue::text("https://example.com")))
        );

        let err = registry.create(2, CborValue::text("nope")).unwrap_err();
        assert!(matches!(err, CborError::InvalidTagContent { tag: 2, .. }));
    }

    #[test]
    fn test_decimal_fraction_shape() {
        let registry = TagRegistry::with_defaults();
        let good = CborValue::Array(vec![CborValue::integer(-2), CborValue::integer(27315)]);
        assert!(registry.create(4, good).is_ok());
        let bad = CborValue::Array(vec![CborValue::integer(-2)]);
        assert!(registry.create(4, bad).is_err());
    }

    #[test]
    fn test_unknown_tag_and_custom_handler() {
        let registry = TagRegistry::empty();
        assert!(matches!(
            registry.create(1000, CborValue::Unsigned(1)),
            Err(CborError::UnknownTag(1000))
        ));

        let registry = registry.with(1000, |_tag: u64, content: CborValue| {
            Ok::<_, CborError>(content)
        });
        assert_eq!(
            registry.create(1000, CborValue::Unsigned(1)).unwrap(),
            CborValue::Unsigned(1)
        );
    }
}
