//! Explicitly injected logging handle.
//!
//! Iris components never reach for a global logger. The application hands a
//! [`LogHandle`] to the builder and everything downstream logs inside that
//! handle's span. A missing handle is a configuration error the builder
//! reports; [`LogHandle::none`] exists for tests and tools that want the
//! framework silent.

use tracing::Span;

/// A logging handle scoped to one component.
///
/// Wraps a [`tracing::Span`]; events emitted within the handle's scope carry
/// the component name as a span field.
///
/// # Example
///
/// ```rust
/// use iris_core::LogHandle;
///
/// let log = LogHandle::new("iris");
/// let _guard = log.span().enter();
/// tracing::info!("server configured");
/// ```
#[derive(Debug, Clone)]
pub struct LogHandle {
    span: Span,
    // Tracked explicitly: span state alone cannot distinguish an absent
    // handle from a present one whose span the subscriber filtered out.
    enabled: bool,
}

impl LogHandle {
    /// Creates a handle rooted at a named component span.
    #[must_use]
    pub fn new(component: &str) -> Self {
        Self {
            span: tracing::info_span!("iris", component = component),
            enabled: true,
        }
    }

    /// Creates a disabled handle. Events inside it go nowhere.
    #[must_use]
    pub fn none() -> Self {
        Self {
            span: Span::none(),
            enabled: false,
        }
    }

    /// Returns `true` for handles created with [`LogHandle::none`].
    #[must_use]
    pub fn is_none(&self) -> bool {
        !self.enabled
    }

    /// Returns the underlying span.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Creates a handle for a sub-component, parented to this one.
    ///
    /// A child of a disabled handle stays disabled.
    #[must_use]
    pub fn child(&self, component: &str) -> Self {
        let span = tracing::info_span!(parent: &self.span, "iris", component = component);
        Self {
            span,
            enabled: self.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_none() {
        assert!(LogHandle::none().is_none());
    }

    #[test]
    fn test_new_is_some_without_subscriber() {
        // No subscriber is installed in unit tests; the handle must still
        // read as present.
        assert!(!LogHandle::new("test").is_none());
        assert!(!LogHandle::new("test").clone().is_none());
    }

    #[test]
    fn test_child_inherits_presence() {
        assert!(!LogHandle::new("test").child("sub").is_none());
        assert!(LogHandle::none().child("sub").is_none());
    }

    #[test]
    fn test_child_does_not_panic_without_subscriber() {
        let log = LogHandle::none();
        let child = log.child("sub");
        let _guard = child.span().enter();
    }
}
