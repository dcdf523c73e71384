use std::fmt;
use std::sync::Arc;

type Resolver = Arc<dyn Fn() -> String + Send + Sync>;

/// A `%identifier%` token substituted when formatted strings are read from a
/// config tree. The resolver runs at format time, so values may change
/// between reads.
#[derive(Clone)]
pub struct StaticPlaceholder {
    identifier: String,
    resolver: Resolver,
}

impl StaticPlaceholder {
    pub fn new<F>(identifier: impl Into<String>, resolver: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            identifier: identifier.into(),
            resolver: Arc::new(resolver),
        }
    }

    /// Placeholder that always yields the same text.
    pub fn fixed(identifier: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self::new(identifier, move || value.clone())
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn value(&self) -> String {
        (self.resolver)()
    }

    pub fn pattern(&self) -> String {
        format!("%{}%", self.identifier)
    }
}

impl fmt::Debug for StaticPlaceholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticPlaceholder")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// Replace every injected `%identifier%` in `text`, in injection order.
pub fn apply_placeholders(text: &str, placeholders: &[StaticPlaceholder]) -> String {
    let mut out = text.to_string();
    for placeholder in placeholders {
        let pattern = placeholder.pattern();
        if out.contains(&pattern) {
            out = out.replace(&pattern, &placeholder.value());
        }
    }
    out
}
