//! The compile-and-match façade (§6).

use crate::error::{CompileError, MatchError};
use crate::flags::MatchFlags;
use crate::lexer::lex;
use crate::matcher::{self, MatchResult};
use crate::nfa::Automaton;

/// A compiled pattern: immutable once built, safe to share (read-only) across
/// threads, cheap to `clone` (deep-copies the state arena, §4.6).
#[derive(Debug)]
pub struct Pattern {
    automaton: Automaton,
}

impl Pattern {
    /// Parses `pattern_text` and builds its automaton. Fails with a [`CompileError`]
    /// describing the offending construct and its byte offset.
    pub fn compile(pattern_text: &str) -> Result<Pattern, CompileError> {
        log::trace!("compiling pattern of {} bytes", pattern_text.len());
        let (tokens, positions) = lex(pattern_text)?;
        let automaton = Automaton::compile(tokens, positions)?;
        Ok(Pattern { automaton })
    }

    /// Matches `subject` against this pattern under `flags`, in search mode unless
    /// `fix_left` is set (§4.8, §4.9).
    pub fn exec(&self, subject: &[u8], flags: MatchFlags) -> Result<MatchResult, MatchError> {
        matcher::run(&self.automaton, subject, flags)
    }

    /// Convenience wrapper: `true` iff a full match exists anywhere in `subject`.
    pub fn is_match(&self, subject: &[u8], flags: MatchFlags) -> Result<bool, MatchError> {
        Ok(self.exec(subject, flags)?.is_match())
    }

    /// Highest numeric capture id assigned to an unnamed group (0 if none).
    pub fn capture_count(&self) -> i32 {
        self.automaton.max_capture_number
    }

    /// Names of every named capturing group, in pattern order.
    pub fn capture_names(&self) -> &[String] {
        &self.automaton.capture_names
    }

    /// Every state reachable from the start state; exposed for debugging and tests
    /// (§9 "the same reachability traversal is retained").
    pub fn reachable_states(&self) -> std::collections::HashSet<usize> {
        self.automaton.reachable_states()
    }
}

impl Clone for Pattern {
    fn clone(&self) -> Self {
        Pattern {
            automaton: self.automaton.deep_clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_matches() {
        let p = Pattern::compile("a(.)c").unwrap();
        let r = p.exec(b"abc", MatchFlags::empty()).unwrap();
        assert!(r.is_match());
        assert_eq!(r.overall, b"abc");
        assert_eq!(r.sub[&1], vec![b"b".to_vec()]);
    }

    #[test]
    fn clone_is_independent() {
        let p = Pattern::compile("a+").unwrap();
        let q = p.clone();
        assert!(q.is_match(b"aaa", MatchFlags::empty()).unwrap());
    }

    #[test]
    fn compile_error_reports_offset() {
        let err = Pattern::compile("a(b").unwrap_err();
        assert_eq!(err.pos(), 3);
    }
}
