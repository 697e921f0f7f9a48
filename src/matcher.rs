//! Backtracking matcher: walks the compiled automaton against a subject, keeping
//! an explicit history stack instead of recursion (§4.8).

use std::collections::HashMap;
use std::ops::Range;

use crate::codec::Codec;
use crate::error::MatchError;
use crate::flags::MatchFlags;
use crate::nfa::{Automaton, CaptureKey, StateId};
use crate::token::{GroupSpec, Test};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchKind {
    None,
    Partial,
    Full,
}

/// `{type, pos, overall string, sub: map<int, list<string>>, named_sub: map<string, list<string>>}` (§3).
///
/// Capture text is returned as raw bytes rather than `String` because byte mode
/// (`utf8` unset) allows subjects that are not valid UTF-8.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchResult {
    pub kind: MatchKind,
    pub pos: usize,
    pub overall: Vec<u8>,
    pub sub: NumericCaptures,
    pub named_sub: NamedCaptures,
}

/// Per-group captured occurrences keyed by numeric slot.
pub type NumericCaptures = HashMap<i32, Vec<Vec<u8>>>;
/// Per-group captured occurrences keyed by name.
pub type NamedCaptures = HashMap<String, Vec<Vec<u8>>>;

impl MatchResult {
    /// A boolean coercion is true iff `kind == Full` (§6).
    pub fn is_match(&self) -> bool {
        self.kind == MatchKind::Full
    }

    fn none(pos: usize) -> Self {
        MatchResult {
            kind: MatchKind::None,
            pos,
            overall: Vec::new(),
            sub: HashMap::new(),
            named_sub: HashMap::new(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Frame {
    state: StateId,
    pos: usize,
    transition_index: usize,
}

/// Per-group occurrence lists, keyed by numeric slot or name (§9 "Capture storage").
#[derive(Default)]
struct Captures {
    numeric: Vec<Vec<Range<usize>>>,
    named: HashMap<String, Vec<Range<usize>>>,
}

impl Captures {
    fn occurrences_mut(&mut self, key: &CaptureKey) -> &mut Vec<Range<usize>> {
        match key {
            CaptureKey::Number(n) => {
                let idx = *n as usize;
                if self.numeric.len() <= idx {
                    self.numeric.resize_with(idx + 1, Vec::new);
                }
                &mut self.numeric[idx]
            }
            CaptureKey::Name(name) => self.named.entry(name.clone()).or_default(),
        }
    }

    fn occurrences(&self, key: &GroupSpec) -> Option<&Vec<Range<usize>>> {
        match key {
            GroupSpec::Number(n) => {
                let target = self.resolve_number(*n)?;
                self.numeric.get(target as usize)
            }
            GroupSpec::Name(name) => self.named.get(name),
        }
    }

    /// §4.7: positive is a 1-based forward index; negative counts back from the
    /// highest numeric slot with at least one occurrence recorded so far.
    fn resolve_number(&self, g: i32) -> Option<i32> {
        if g > 0 {
            Some(g)
        } else if g < 0 {
            let highest = self.highest_present()?;
            let target = highest - (-g) + 1;
            if target >= 1 {
                Some(target)
            } else {
                None
            }
        } else {
            None
        }
    }

    fn highest_present(&self) -> Option<i32> {
        for i in (1..self.numeric.len()).rev() {
            if !self.numeric[i].is_empty() {
                return Some(i as i32);
            }
        }
        None
    }

    fn materialize(&self, subject: &[u8]) -> (NumericCaptures, NamedCaptures) {
        let mut sub = HashMap::new();
        for (i, occs) in self.numeric.iter().enumerate() {
            if i == 0 || occs.is_empty() {
                continue;
            }
            sub.insert(i as i32, occs.iter().map(|r| subject[r.clone()].to_vec()).collect());
        }
        let named = self
            .named
            .iter()
            .map(|(k, occs)| (k.clone(), occs.iter().map(|r| subject[r.clone()].to_vec()).collect()))
            .collect();
        (sub, named)
    }
}

fn occurrence_at(list: &[Range<usize>], k: i32) -> Option<&Range<usize>> {
    if k > 0 {
        list.get((k - 1) as usize)
    } else if k < 0 {
        let idx = list.len() as i64 + k as i64;
        if idx >= 0 {
            list.get(idx as usize)
        } else {
            None
        }
    } else {
        None
    }
}

pub fn run(automaton: &Automaton, subject: &[u8], flags: MatchFlags) -> Result<MatchResult, MatchError> {
    let codec = Codec::select(flags.contains(MatchFlags::UTF8));
    let mut start = 0usize;
    let mut groups = Captures::default();
    let mut history: Vec<Frame> = Vec::new();
    let mut partials: Vec<MatchResult> = Vec::new();
    let mut best: Option<MatchResult> = None;
    let mut current = Frame {
        state: automaton.start,
        pos: start,
        transition_index: 0,
    };

    'outer: loop {
        loop {
            if current.state == automaton.accept {
                let fix_right_ok =
                    !flags.contains(MatchFlags::FIX_RIGHT) || current.pos == subject.len();
                if fix_right_ok {
                    let (sub, named_sub) = groups.materialize(subject);
                    let candidate = MatchResult {
                        kind: MatchKind::Full,
                        pos: start,
                        overall: subject[start..current.pos].to_vec(),
                        sub,
                        named_sub,
                    };
                    if flags.contains(MatchFlags::LONGEST) {
                        if best.as_ref().map_or(true, |b| candidate.overall.len() > b.overall.len()) {
                            best = Some(candidate);
                        }
                        // fall through to step 3 to keep exploring for a longer match
                    } else {
                        return Ok(candidate);
                    }
                }
            } else if current.transition_index < automaton.states[current.state].transitions.len() {
                let state = &automaton.states[current.state];
                if state.begin_capture {
                    let top = state.captures.last().expect("begin_capture with no descriptor");
                    groups.occurrences_mut(top).push(current.pos..current.pos);
                }
                let (test, target) = state.transitions[current.transition_index].clone();
                match eval_test(&test, codec, subject, current.pos, &groups, flags)? {
                    Some(newpos) => {
                        let state_captures = automaton.states[current.state].captures.clone();
                        for key in &state_captures {
                            groups.occurrences_mut(key).last_mut().unwrap().end = newpos;
                        }
                        history.push(current);
                        current = Frame {
                            state: target,
                            pos: newpos,
                            transition_index: 0,
                        };
                    }
                    None => {
                        if automaton.states[current.state].begin_capture {
                            let top = automaton.states[current.state]
                                .captures
                                .last()
                                .expect("begin_capture with no descriptor")
                                .clone();
                            groups.occurrences_mut(&top).pop();
                        }
                        current.transition_index += 1;
                    }
                }
                continue;
            }

            if flags.contains(MatchFlags::PARTIAL)
                && current.state != automaton.accept
                && current.pos == subject.len()
            {
                let (sub, named_sub) = groups.materialize(subject);
                partials.push(MatchResult {
                    kind: MatchKind::Partial,
                    pos: start,
                    overall: subject[start..current.pos].to_vec(),
                    sub,
                    named_sub,
                });
            }

            let mut resumed = false;
            while let Some(frame) = history.pop() {
                let frame_state = &automaton.states[frame.state];
                let captures = frame_state.captures.clone();
                let begin_capture = frame_state.begin_capture;
                let nonstop = frame_state.nonstop;
                for key in &captures {
                    if let Some(last) = groups.occurrences_mut(key).last_mut() {
                        last.end = frame.pos;
                    }
                }
                if begin_capture {
                    let top = captures.last().expect("begin_capture with no descriptor");
                    groups.occurrences_mut(top).pop();
                }
                current = Frame {
                    state: frame.state,
                    pos: frame.pos,
                    transition_index: frame.transition_index + 1,
                };
                if !nonstop {
                    resumed = true;
                    break;
                }
            }
            if resumed {
                continue;
            }
            break;
        }

        if flags.contains(MatchFlags::LONGEST) {
            if let Some(b) = best.take() {
                return Ok(b);
            }
        }

        if !flags.contains(MatchFlags::FIX_LEFT) && start < subject.len() {
            codec.advance(subject, &mut start)?;
            groups = Captures::default();
            history.clear();
            current = Frame {
                state: automaton.start,
                pos: start,
                transition_index: 0,
            };
            continue 'outer;
        } else if !partials.is_empty() {
            return Ok(partials.remove(0));
        } else {
            return Ok(MatchResult::none(start));
        }
    }
}

/// Evaluates a single test at `pos`, returning the position after consuming input
/// on success. `None` means the test failed (no input consumed); an `Err` means the
/// subject contained malformed UTF-8 and `utf8` matching was requested.
fn eval_test(
    test: &Test,
    codec: Codec,
    subject: &[u8],
    pos: usize,
    groups: &Captures,
    flags: MatchFlags,
) -> Result<Option<usize>, MatchError> {
    let multiline = flags.contains(MatchFlags::MULTILINE);
    Ok(match test {
        Test::Epsilon => Some(pos),

        // §9 open question 1: the source excludes LF only when multiline is set,
        // opposite of common convention. Preserved here.
        Test::Any => {
            let mut p = pos;
            match codec.peek(subject, p)? {
                None => None,
                Some(cp) if multiline && cp == '\n' as u32 => None,
                Some(_) => {
                    codec.advance(subject, &mut p)?;
                    Some(p)
                }
            }
        }

        Test::BeginOfLine => {
            let at_start = pos == 0;
            let after_newline = multiline && codec.peek_prev(subject, pos)? == Some('\n' as u32);
            if at_start || after_newline {
                Some(pos)
            } else {
                None
            }
        }
        // In multiline mode the original implementation advances past the newline
        // when `$` matches at an internal boundary (not at true end-of-subject),
        // so that a following `^` lands just after it rather than just before it.
        Test::EndOfLine => {
            let at_end = pos == subject.len();
            if at_end {
                Some(pos)
            } else if multiline && codec.peek(subject, pos)? == Some('\n' as u32) {
                let mut p = pos;
                codec.advance(subject, &mut p)?;
                Some(p)
            } else {
                None
            }
        }
        Test::BeginOfText => {
            if pos == 0 {
                Some(pos)
            } else {
                None
            }
        }
        Test::EndOfText => {
            if pos == subject.len() {
                Some(pos)
            } else {
                None
            }
        }

        // `\N` consumes one non-newline code point when available, otherwise fails
        // (§9 open question 3: no zero-width interpretation).
        Test::Newline { neg } => {
            let mut p = pos;
            let first = codec.peek(subject, p)?;
            if *neg {
                match first {
                    Some(cp) if cp != '\r' as u32 && cp != '\n' as u32 => {
                        codec.advance(subject, &mut p)?;
                        Some(p)
                    }
                    _ => None,
                }
            } else {
                match first {
                    Some(cp) if cp == '\r' as u32 => {
                        codec.advance(subject, &mut p)?;
                        if codec.peek(subject, p)? == Some('\n' as u32) {
                            codec.advance(subject, &mut p)?;
                        }
                        Some(p)
                    }
                    Some(cp) if cp == '\n' as u32 => {
                        codec.advance(subject, &mut p)?;
                        Some(p)
                    }
                    _ => None,
                }
            }
        }

        Test::Character(class) => {
            let mut p = pos;
            match codec.peek(subject, p)? {
                Some(cp) if class.matches(cp) => {
                    codec.advance(subject, &mut p)?;
                    Some(p)
                }
                _ => None,
            }
        }

        Test::Backref { group, occurrence } => {
            let list = match groups.occurrences(group) {
                Some(list) => list,
                None => return Ok(None),
            };
            let target = match occurrence_at(list, *occurrence) {
                Some(r) => r.clone(),
                None => return Ok(None),
            };
            let len = target.end - target.start;
            if pos + len > subject.len() || subject[pos..pos + len] != subject[target.clone()] {
                None
            } else {
                Some(pos + len)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::nfa::Automaton;

    fn compile(pattern: &str) -> Automaton {
        let (tokens, positions) = lex(pattern).unwrap();
        Automaton::compile(tokens, positions).unwrap()
    }

    #[test]
    fn simple_literal_match() {
        let a = compile("abc");
        let r = run(&a, b"xxabcxx", MatchFlags::empty()).unwrap();
        assert!(r.is_match());
        assert_eq!(r.overall, b"abc");
        assert_eq!(r.pos, 2);
    }

    #[test]
    fn single_capture_group() {
        let a = compile("a(.)c");
        let r = run(&a, b"abc", MatchFlags::empty()).unwrap();
        assert!(r.is_match());
        assert_eq!(r.overall, b"abc");
        assert_eq!(r.sub[&1], vec![b"b".to_vec()]);
    }

    #[test]
    fn repeated_group_records_every_occurrence() {
        let a = compile("a(..)+z");
        let r = run(&a, b"abcdefgz", MatchFlags::empty()).unwrap();
        assert!(r.is_match());
        assert_eq!(
            r.sub[&1],
            vec![b"bc".to_vec(), b"de".to_vec(), b"fg".to_vec()]
        );
    }

    #[test]
    fn atomic_group_does_not_backtrack_into_alternation() {
        let a = compile("a(?>bc|b)c");
        assert!(!run(&a, b"abd", MatchFlags::empty()).unwrap().is_match());
        // The atomic group commits to its first-matching branch ("bc"); since that
        // leaves no room for the trailing literal `c` in "abcd", only a subject with
        // the literal still available after "bc" succeeds.
        assert!(run(&a, b"abcc", MatchFlags::empty()).unwrap().is_match());
        assert!(!run(&a, b"abcd", MatchFlags::empty()).unwrap().is_match());
    }

    #[test]
    fn search_mode_finds_digits_mid_subject() {
        let a = compile("[0-9]+");
        let r = run(&a, b"abc123def", MatchFlags::empty()).unwrap();
        assert!(r.is_match());
        assert_eq!(r.pos, 3);
        assert_eq!(r.overall, b"123");

        assert!(!run(&a, b"abc123def", MatchFlags::FIX_LEFT).unwrap().is_match());
        assert!(!run(&a, b"abc123def", MatchFlags::FIX_RIGHT).unwrap().is_match());
        assert!(run(&a, b"123", MatchFlags::FIX_LEFT | MatchFlags::FIX_RIGHT)
            .unwrap()
            .is_match());
    }

    #[test]
    fn verbatim_block_matches_metacharacters_literally() {
        let a = compile(r"\Q.*\E");
        let r = run(&a, b".*", MatchFlags::empty()).unwrap();
        assert!(r.is_match());
        assert_eq!(r.overall, b".*");
    }

    #[test]
    fn backreference_by_occurrence_index() {
        let a = compile(r"(.)(.)\g<2>\g<1>");
        let r = run(&a, b"abba", MatchFlags::empty()).unwrap();
        assert!(r.is_match());
        assert_eq!(r.sub[&1], vec![b"a".to_vec()]);
        assert_eq!(r.sub[&2], vec![b"b".to_vec()]);
    }

    #[test]
    fn multiline_anchors_match_at_internal_newlines() {
        let a = compile(r"^123$^abc$^456$");
        assert!(run(&a, b"123\nabc\n456", MatchFlags::MULTILINE)
            .unwrap()
            .is_match());
        assert!(!run(&a, b"123\nabc\n456", MatchFlags::empty())
            .unwrap()
            .is_match());
    }

    #[test]
    fn unicode_escape_matches_multibyte_code_point() {
        let a = compile(r"\u{20AC}");
        let r = run(&a, "€".as_bytes(), MatchFlags::UTF8).unwrap();
        assert!(r.is_match());
        assert_eq!(r.overall, "€".as_bytes());
    }

    #[test]
    fn greedy_star_is_at_least_as_long_as_lazy_star() {
        let greedy = compile("a*");
        let lazy = compile("a*?");
        let g = run(&greedy, b"aaaa", MatchFlags::FIX_LEFT).unwrap();
        let l = run(&lazy, b"aaaa", MatchFlags::FIX_LEFT).unwrap();
        assert!(g.overall.len() >= l.overall.len());
        assert_eq!(g.overall.len(), 4);
    }

    #[test]
    fn negative_group_and_occurrence_indices() {
        let a = compile(r"(a)(b)(c)\g<-1,-1>");
        let r = run(&a, b"abcc", MatchFlags::empty()).unwrap();
        assert!(r.is_match());
        assert_eq!(r.overall, b"abcc");
    }

    #[test]
    fn named_capture_is_reachable_by_name_only() {
        let a = compile(r"(?<year>[0-9]{4})-(?<month>[0-9]{2})");
        let r = run(&a, b"2024-07", MatchFlags::empty()).unwrap();
        assert!(r.is_match());
        assert_eq!(r.named_sub["year"], vec![b"2024".to_vec()]);
        assert_eq!(r.named_sub["month"], vec![b"07".to_vec()]);
        assert!(r.sub.is_empty());
    }

    #[test]
    fn partial_flag_records_a_prefix_match_at_end_of_subject() {
        let a = compile("abcd");
        let r = run(&a, b"ab", MatchFlags::PARTIAL).unwrap();
        assert_eq!(r.kind, MatchKind::Partial);
        assert_eq!(r.overall, b"ab");
    }

    #[test]
    fn class_subtraction_and_intersection() {
        let sub = compile("[a-z-[aeiou]]+");
        assert!(run(&sub, b"xyz", MatchFlags::FIX_LEFT | MatchFlags::FIX_RIGHT)
            .unwrap()
            .is_match());
        assert!(!run(&sub, b"xay", MatchFlags::FIX_LEFT | MatchFlags::FIX_RIGHT)
            .unwrap()
            .is_match());

        let inter = compile("[a-z&&[^aeiou]]+");
        assert!(run(&inter, b"xyz", MatchFlags::FIX_LEFT | MatchFlags::FIX_RIGHT)
            .unwrap()
            .is_match());
    }
}
