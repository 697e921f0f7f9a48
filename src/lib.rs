//! A backtracking regular-expression engine with atomic groups, multi-occurrence
//! captures, and indexed or named backreferences.
//!
//! ```
//! use qregex::{MatchFlags, Pattern};
//!
//! let pattern = Pattern::compile(r"a(.)c").unwrap();
//! let m = pattern.exec(b"xxabcxx", MatchFlags::empty()).unwrap();
//! assert!(m.is_match());
//! assert_eq!(m.overall, b"abc");
//! assert_eq!(m.sub[&1], vec![b"b".to_vec()]);
//! ```
//!
//! The pipeline is pattern text → lexer (token stream) → NFA builder (automaton
//! with epsilon transitions, capture and atomic-group annotations) → backtracking
//! matcher. See [`Pattern::compile`] and [`Pattern::exec`].

mod class;
mod codec;
mod error;
mod flags;
mod lexer;
mod matcher;
mod nfa;
mod pattern;
mod token;

pub use error::{CompileError, CompileErrorKind, MatchError};
pub use flags::MatchFlags;
pub use matcher::{MatchKind, MatchResult, NamedCaptures, NumericCaptures};
pub use pattern::Pattern;
