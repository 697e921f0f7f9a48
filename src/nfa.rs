//! NFA builder: recursive-descent parser over the token stream that emits an
//! automaton of states linked by labeled transitions (§4.5).

use std::collections::HashSet;

use crate::error::{CompileError, CompileErrorKind};
use crate::token::{GroupAttrs, QuantifierRange, Test, Token};

pub type StateId = usize;

/// A capture group's identity: numeric ids are assigned only to unnamed captures
/// (§9 open question 4); named captures live solely in the named map.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CaptureKey {
    Number(i32),
    Name(String),
}

#[derive(Clone, Debug, Default)]
pub struct State {
    pub transitions: Vec<(Test, StateId)>,
    pub begin_capture: bool,
    pub captures: Vec<CaptureKey>,
    pub nonstop: bool,
}

/// A compiled sub-pattern with a single entry and single exit state.
#[derive(Clone, Copy, Debug)]
pub struct Chain {
    pub begin: StateId,
    pub end: StateId,
}

/// The root chain plus the states arena and bookkeeping needed by the matcher.
#[derive(Debug)]
pub struct Automaton {
    pub states: Vec<State>,
    pub start: StateId,
    pub accept: StateId,
    /// Highest numeric capture id assigned (0 if the pattern has no unnamed groups).
    pub max_capture_number: i32,
    pub capture_names: Vec<String>,
}

impl Automaton {
    pub fn compile(tokens: Vec<Token>, positions: Vec<usize>) -> Result<Automaton, CompileError> {
        log::trace!("building NFA from {} tokens", tokens.len());
        let mut builder = Builder {
            tokens,
            positions,
            pos: 0,
            states: Vec::new(),
            capture_stack: Vec::new(),
            nonstop: false,
            next_capture_id: 1,
            capture_names: Vec::new(),
        };
        let chain = builder.parse_expression()?;
        if builder.pos < builder.tokens.len() {
            let kind = if matches!(builder.tokens[builder.pos], Token::RParen) {
                CompileErrorKind::UnbalancedConstruct("unmatched ')'")
            } else {
                CompileErrorKind::UnparsedTrailing
            };
            let offset = builder.positions[builder.pos];
            return Err(CompileError::new(kind, offset));
        }
        Ok(Automaton {
            states: builder.states,
            start: chain.begin,
            accept: chain.end,
            max_capture_number: builder.next_capture_id - 1,
            capture_names: builder.capture_names,
        })
    }

    /// Deep-copies the automaton's state graph, remapping every reachable state to
    /// a fresh index (§4.6 "copying a pattern clones its chain").
    pub fn deep_clone(&self) -> Automaton {
        Automaton {
            states: self.states.clone(),
            start: self.start,
            accept: self.accept,
            max_capture_number: self.max_capture_number,
            capture_names: self.capture_names.clone(),
        }
    }

    /// Collects every state reachable from `start`, breaking quantifier cycles by
    /// tracking a visited set (§4.6).
    pub fn reachable_states(&self) -> HashSet<StateId> {
        let mut visited = HashSet::new();
        let mut stack = vec![self.start];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            for &(_, target) in &self.states[id].transitions {
                stack.push(target);
            }
        }
        visited
    }
}

type Res<T> = Result<T, CompileError>;

struct Builder {
    tokens: Vec<Token>,
    positions: Vec<usize>,
    pos: usize,
    states: Vec<State>,
    capture_stack: Vec<CaptureKey>,
    nonstop: bool,
    next_capture_id: i32,
    capture_names: Vec<String>,
}

impl Builder {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn new_state(&mut self) -> StateId {
        let id = self.states.len();
        self.states.push(State {
            transitions: Vec::new(),
            begin_capture: false,
            captures: self.capture_stack.clone(),
            nonstop: self.nonstop,
        });
        id
    }

    fn add_epsilon(&mut self, src: StateId, dst: StateId) {
        self.states[src].transitions.push((Test::Epsilon, dst));
    }

    /// Absorbs `src`'s outgoing transitions into `dst`, retargets any transition
    /// pointing at `src` to point at `dst` instead, and unions the capture,
    /// begin_capture and nonstop flags (§4.5).
    fn merge_state(&mut self, dst: StateId, src: StateId) {
        if dst == src {
            return;
        }
        let src_state = std::mem::take(&mut self.states[src]);
        self.states[dst].transitions.extend(src_state.transitions);
        self.states[dst].begin_capture |= src_state.begin_capture;
        for cap in src_state.captures {
            if !self.states[dst].captures.contains(&cap) {
                self.states[dst].captures.push(cap);
            }
        }
        self.states[dst].nonstop |= src_state.nonstop;
        for state in &mut self.states {
            for (_, target) in &mut state.transitions {
                if *target == src {
                    *target = dst;
                }
            }
        }
    }

    /// Deep-copies a sub-chain, mapping each reachable state exactly once and
    /// preserving `begin_capture`, `captures`, `nonstop` and transition order.
    fn clone_chain(&mut self, chain: Chain) -> Chain {
        let order = self.collect_reachable(chain.begin);
        let mut map = std::collections::HashMap::with_capacity(order.len());
        for &old in &order {
            let new_id = self.states.len();
            self.states.push(State::default());
            map.insert(old, new_id);
        }
        for &old in &order {
            let new_id = map[&old];
            let old_state = self.states[old].clone();
            let transitions = old_state
                .transitions
                .iter()
                .map(|(t, tgt)| (t.clone(), map[tgt]))
                .collect();
            self.states[new_id] = State {
                transitions,
                begin_capture: old_state.begin_capture,
                captures: old_state.captures,
                nonstop: old_state.nonstop,
            };
        }
        Chain {
            begin: map[&chain.begin],
            end: map[&chain.end],
        }
    }

    fn collect_reachable(&self, start: StateId) -> Vec<StateId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            for &(_, target) in &self.states[id].transitions {
                stack.push(target);
            }
        }
        order
    }

    // expression := term ("|" term)*
    fn parse_expression(&mut self) -> Res<Chain> {
        log::trace!("parse_expression at token {}", self.pos);
        let mut chain = self.parse_term()?;
        while matches!(self.peek(), Some(Token::Alt)) {
            self.bump();
            let next = self.parse_term()?;
            chain = self.alternate(chain, next);
        }
        Ok(chain)
    }

    fn alternate(&mut self, a: Chain, b: Chain) -> Chain {
        let branch = self.new_state();
        let join = self.new_state();
        self.add_epsilon(branch, a.begin);
        self.add_epsilon(branch, b.begin);
        self.add_epsilon(a.end, join);
        self.add_epsilon(b.end, join);
        Chain { begin: branch, end: join }
    }

    // term := factor* (relaxed from factor+ so empty alternatives like `a|` and
    // empty groups `()` compile, matching every mainstream regex engine)
    fn parse_term(&mut self) -> Res<Chain> {
        if !self.can_start_factor() {
            let s = self.new_state();
            return Ok(Chain { begin: s, end: s });
        }
        let mut chain = self.parse_factor()?;
        while self.can_start_factor() {
            let next = self.parse_factor()?;
            self.merge_state(chain.end, next.begin);
            chain = Chain {
                begin: chain.begin,
                end: next.end,
            };
        }
        Ok(chain)
    }

    fn can_start_factor(&self) -> bool {
        !matches!(self.peek(), None | Some(Token::Alt) | Some(Token::RParen))
    }

    // factor := atom ( range | "?" | "*" | "+" )? "?"?
    fn parse_factor(&mut self) -> Res<Chain> {
        let atom = self.parse_atom()?;
        let quant = match self.peek() {
            Some(Token::Range(r)) => {
                let r = *r;
                self.bump();
                return self.apply_quantifier(atom, r);
            }
            Some(Token::QMark) => Some(QuantifierRange {
                begin: 0,
                end: 1,
                infinite: false,
                lazy: false,
            }),
            Some(Token::Star) => Some(QuantifierRange {
                begin: 0,
                end: 0,
                infinite: true,
                lazy: false,
            }),
            Some(Token::Plus) => Some(QuantifierRange {
                begin: 1,
                end: 0,
                infinite: true,
                lazy: false,
            }),
            _ => None,
        };
        match quant {
            None => Ok(atom),
            Some(mut q) => {
                self.bump();
                if matches!(self.peek(), Some(Token::QMark)) {
                    self.bump();
                    q.lazy = true;
                }
                self.apply_quantifier(atom, q)
            }
        }
    }

    /// Quantifier assembly for atom `A` with `begin=n, end=m` (§4.5).
    fn apply_quantifier(&mut self, atom: Chain, q: QuantifierRange) -> Res<Chain> {
        let overall_begin;
        let mut tail;
        if q.begin == 0 {
            tail = self.new_state();
            overall_begin = tail;
        } else {
            let first = self.clone_chain(atom);
            overall_begin = first.begin;
            let mut cur_end = first.end;
            for _ in 1..q.begin {
                let next = self.clone_chain(atom);
                self.merge_state(cur_end, next.begin);
                cur_end = next.end;
            }
            tail = cur_end;
        }

        if q.infinite {
            let loop_copy = self.clone_chain(atom);
            let exit = self.new_state();
            self.add_epsilon(tail, loop_copy.begin);
            if q.lazy {
                self.add_epsilon(loop_copy.end, exit);
                self.add_epsilon(loop_copy.end, loop_copy.begin);
            } else {
                self.add_epsilon(loop_copy.end, loop_copy.begin);
                self.add_epsilon(loop_copy.end, exit);
            }
            self.add_epsilon(tail, exit);
            Ok(Chain {
                begin: overall_begin,
                end: exit,
            })
        } else {
            let extra = q.end - q.begin;
            let mut cur_end = tail;
            for _ in 0..extra {
                let opt = self.clone_chain(atom);
                if q.lazy {
                    self.states[opt.begin]
                        .transitions
                        .insert(0, (Test::Epsilon, opt.end));
                } else {
                    self.states[opt.begin].transitions.push((Test::Epsilon, opt.end));
                }
                self.merge_state(cur_end, opt.begin);
                cur_end = opt.end;
            }
            tail = cur_end;
            Ok(Chain {
                begin: overall_begin,
                end: tail,
            })
        }
    }

    // atom := "(" expression ")" | Test
    fn parse_atom(&mut self) -> Res<Chain> {
        let offset = self.positions[self.pos];
        match self.bump() {
            Some(Token::LParen(attrs)) => self.parse_group(attrs),
            Some(Token::Test(test)) => Ok(self.single_test_chain(test)),
            Some(_) => Err(CompileError::new(
                CompileErrorKind::UnbalancedConstruct("quantifier with no preceding atom"),
                offset,
            )),
            None => Err(CompileError::new(
                CompileErrorKind::UnbalancedConstruct("unexpected end of pattern"),
                offset,
            )),
        }
    }

    fn single_test_chain(&mut self, test: Test) -> Chain {
        let begin = self.new_state();
        let end = self.new_state();
        self.states[begin].transitions.push((test, end));
        Chain { begin, end }
    }

    fn parse_group(&mut self, attrs: GroupAttrs) -> Res<Chain> {
        let prev_nonstop = self.nonstop;
        if attrs.atomic {
            self.nonstop = true;
        }
        if attrs.capture {
            let key = if attrs.named {
                let name = attrs.name.clone().unwrap();
                self.capture_names.push(name.clone());
                CaptureKey::Name(name)
            } else {
                let id = self.next_capture_id;
                self.next_capture_id += 1;
                CaptureKey::Number(id)
            };
            self.capture_stack.push(key);
        }
        let p = self.new_state();
        if attrs.capture {
            self.states[p].begin_capture = true;
        }
        let inner = self.parse_expression()?;
        self.expect_rparen()?;
        if attrs.capture {
            self.capture_stack.pop();
        }
        self.nonstop = prev_nonstop;
        let q = self.new_state();
        self.add_epsilon(p, inner.begin);
        self.add_epsilon(inner.end, q);
        Ok(Chain { begin: p, end: q })
    }

    fn expect_rparen(&mut self) -> Res<()> {
        let offset = self.positions[self.pos];
        match self.bump() {
            Some(Token::RParen) => Ok(()),
            _ => Err(CompileError::new(
                CompileErrorKind::UnbalancedConstruct("missing ')'"),
                offset,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn build(pattern: &str) -> Automaton {
        let (tokens, positions) = lex(pattern).unwrap();
        Automaton::compile(tokens, positions).unwrap()
    }

    #[test]
    fn simple_concat_has_no_stray_epsilon_hub() {
        let a = build("ab");
        // Every state reachable, and transitions chain through exactly 2 test edges.
        assert!(a.reachable_states().len() >= 2);
    }

    #[test]
    fn quantifier_clone_produces_independent_states() {
        let a = build("a{2,4}");
        assert!(a.reachable_states().len() > 4);
    }

    #[test]
    fn capture_ids_assigned_in_order_skipping_named() {
        let a = build("(a)(?<x>b)(c)");
        assert_eq!(a.max_capture_number, 2);
        assert_eq!(a.capture_names, vec!["x".to_string()]);
    }

    #[test]
    fn unmatched_paren_is_error() {
        let (t, p) = lex("(a").unwrap();
        assert!(Automaton::compile(t, p).is_err());
        let (t, p) = lex("a)").unwrap();
        assert!(Automaton::compile(t, p).is_err());
    }

    #[test]
    fn empty_alternative_compiles() {
        let (t, p) = lex("a|").unwrap();
        assert!(Automaton::compile(t, p).is_ok());
        let (t, p) = lex("()").unwrap();
        assert!(Automaton::compile(t, p).is_ok());
    }
}
