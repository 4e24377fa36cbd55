//! Call-local trace scope.
//!
//! A [`TraceScope`] lives for exactly one logical call of the retry helper.
//! It owns a `tracing` span for the call, remembers the tags attached to it
//! and whether diagnostic logging has been forced. Dropping the scope closes
//! the span, so it is released on every exit path.

use std::fmt;

use tracing::field;

/// Tag names understood by the trace scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    TraceId,
}

impl TagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TagKind::TraceId => "TRACE_ID",
        }
    }
}

/// Opaque identifier for one request; unique per process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trace state for one call.
pub struct TraceScope {
    span: tracing::Span,
    tags: Vec<(TagKind, String)>,
    forced: bool,
}

impl TraceScope {
    /// Open a scope for a call labelled `action`.
    pub fn open(action: &str) -> Self {
        let span = tracing::info_span!(
            "retry",
            action,
            trace_id = field::Empty,
            forced = field::Empty
        );
        Self {
            span,
            tags: Vec::new(),
            forced: false,
        }
    }

    /// Attach a tag; `TRACE_ID` is also recorded on the span.
    pub fn add_tag(&mut self, kind: TagKind, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        if kind == TagKind::TraceId {
            self.span.record("trace_id", value.as_str());
        }
        self.tags.push((kind, value));
        self
    }

    /// Force diagnostic logging for the rest of the call.
    ///
    /// Records `forced = true` on the span; the default log filter enables
    /// every level inside such a span from the next time it is entered.
    pub fn force_logging(&mut self) -> &mut Self {
        self.forced = true;
        self.span.record("forced", true);
        self
    }

    pub fn is_tracing(&self) -> bool {
        self.forced
    }

    pub fn tags(&self) -> &[(TagKind, String)] {
        &self.tags
    }

    /// Last value attached for `kind`.
    pub fn tag(&self, kind: TagKind) -> Option<&str> {
        self.tags
            .iter()
            .rev()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| v.as_str())
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        if self.forced {
            self.span.in_scope(|| {
                tracing::debug!(tags = self.tags.len(), "closing forced trace scope");
            });
        }
    }
}

impl fmt::Debug for TraceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceScope")
            .field("tags", &self.tags)
            .field("forced", &self.forced)
            .finish()
    }
}
