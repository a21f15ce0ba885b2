use std::fmt;
use std::sync::Arc;

use crate::entry::Value;

/// Returns `true` when `new` differs meaningfully from `old`.
pub type UpdatePredicate = dyn Fn(Option<&Value>, Option<&Value>) -> bool + Send + Sync;

/// Decides whether a write changes anything worth persisting.
#[derive(Clone)]
pub enum UpdateCheck {
    /// Always write; the stored value is never consulted.
    Always,
    /// Write when the structural JSON value differs.
    ByValue,
    /// Caller-supplied predicate.
    Custom(Arc<UpdatePredicate>),
}

impl UpdateCheck {
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(Option<&Value>, Option<&Value>) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Self::Always)
    }

    /// Never called for [`UpdateCheck::Always`] by the store; returns `true`
    /// there for completeness.
    pub fn needs_update(&self, old: Option<&Value>, new: Option<&Value>) -> bool {
        match self {
            Self::Always => true,
            Self::ByValue => old != new,
            Self::Custom(predicate) => predicate(old, new),
        }
    }

    /// Whether two checks are the same predicate.
    ///
    /// `Always` is never the same as anything, including itself: two
    /// unconditional writes are never merged.
    pub fn same_predicate(&self, other: &UpdateCheck) -> bool {
        match (self, other) {
            (Self::ByValue, Self::ByValue) => true,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Default for UpdateCheck {
    fn default() -> Self {
        Self::ByValue
    }
}

impl fmt::Debug for UpdateCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::ByValue => f.write_str("ByValue"),
            Self::Custom(p) => write!(f, "Custom({:p})", Arc::as_ptr(p)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn by_value_compares_structurally() {
        let check = UpdateCheck::ByValue;
        assert!(!check.needs_update(Some(&json!({"a": 1, "b": 2})), Some(&json!({"b": 2, "a": 1}))));
        assert!(check.needs_update(Some(&json!(1)), Some(&json!(2))));
        assert!(check.needs_update(None, Some(&json!(2))));
        assert!(!check.needs_update(None, None));
    }

    #[test]
    fn custom_predicate_is_applied_literally() {
        let check = UpdateCheck::custom(|old, new| match (old, new) {
            (Some(o), Some(n)) => o["version"] != n["version"],
            _ => true,
        });
        let old = json!({"version": 1, "title": "a"});
        let new = json!({"version": 1, "title": "b"});
        assert!(!check.needs_update(Some(&old), Some(&new)));
    }

    #[test]
    fn predicate_identity() {
        let custom = UpdateCheck::custom(|_, _| true);
        let clone = custom.clone();
        let other = UpdateCheck::custom(|_, _| true);
        assert!(custom.same_predicate(&clone));
        assert!(!custom.same_predicate(&other));
        assert!(UpdateCheck::ByValue.same_predicate(&UpdateCheck::ByValue));
        assert!(!UpdateCheck::Always.same_predicate(&UpdateCheck::Always));
        assert!(!UpdateCheck::ByValue.same_predicate(&custom));
    }

    proptest! {
        #[test]
        fn by_value_never_updates_equal_values(n in any::<i64>(), s in ".{0,16}") {
            let v = json!({"n": n, "s": s});
            prop_assert!(!UpdateCheck::ByValue.needs_update(Some(&v), Some(&v.clone())));
        }
    }
}
