//! The parser boundary.
//!
//! The pipeline does not know how to turn source text into artifacts. It hands each
//! [`FileRecord`] to a [`Parser`] and treats whatever comes back as opaque data.

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::{FileRecord, ParseOutput};

/// Pluggable language parser.
///
/// Implementations run on the blocking thread pool, so they may do synchronous I/O.
/// Long-running parsers should poll [`ParseContext::is_cancelled`] and return early;
/// a result produced after the file timed out is discarded anyway.
pub trait Parser: Send + Sync {
    fn parse_file(&self, file: &FileRecord, ctx: &ParseContext) -> anyhow::Result<ParseOutput>;

    /// Get the name of this parser for reporting
    fn name(&self) -> &str;
}

/// Per-call context handed to [`Parser::parse_file`]
#[derive(Clone, Debug)]
pub struct ParseContext {
    token: CancellationToken,
    deadline: Instant,
}

impl ParseContext {
    pub fn new(token: CancellationToken, deadline: Instant) -> Self {
        Self { token, deadline }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Cancelled, or the deadline has already passed
    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || Instant::now() >= self.deadline
    }
}

impl<P: Parser + ?Sized> Parser for std::sync::Arc<P> {
    fn parse_file(&self, file: &FileRecord, ctx: &ParseContext) -> anyhow::Result<ParseOutput> {
        (**self).parse_file(file, ctx)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_context_reflects_token() {
        let token = CancellationToken::new();
        let ctx = ParseContext::new(token.clone(), Instant::now() + Duration::from_secs(60));
        assert!(!ctx.should_stop());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.should_stop());
    }

    #[test]
    fn test_context_past_deadline_stops() {
        let ctx = ParseContext::new(CancellationToken::new(), Instant::now());
        assert!(ctx.should_stop());
        assert!(!ctx.is_cancelled());
    }
}
