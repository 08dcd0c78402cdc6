//! A small grammar matcher over text lines.
//!
//! A [`Grammar`] is a table of states. Each state is an ordered list of
//! alternatives and each alternative is a sequence of [`Node`]s. Matching is
//! ordered choice with backtracking, run as an explicit work-list machine:
//! nothing recurses, so deep or right-recursive states cost heap, not stack.
//!
//! [`Node::Binder`] records the span its inner node matched, plus whatever
//! binders fired inside it, under a name. The decoder reads those names back
//! out of the resulting [`Bindings`].

use std::ops::Range;

/// Index of a state inside its [`Grammar`].
pub type StateId = usize;

/// A leaf that consumes text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// Exact text.
    Literal(&'static str),
    /// One ASCII hex digit.
    HexDigit,
    /// One space.
    Separator,
    /// Consumes nothing; fails where the text starts with this literal.
    NotAhead(&'static str),
}

impl Terminal {
    fn match_len(self, rest: &str) -> Option<usize> {
        match self {
            Terminal::Literal(text) => rest.starts_with(text).then_some(text.len()),
            Terminal::HexDigit => rest
                .as_bytes()
                .first()
                .filter(|b| b.is_ascii_hexdigit())
                .map(|_| 1),
            Terminal::Separator => rest.starts_with(' ').then_some(1),
            Terminal::NotAhead(text) => (!rest.starts_with(text)).then_some(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    State(StateId),
    Terminal(Terminal),
    Binder { name: &'static str, node: Box<Node> },
}

pub fn lit(text: &'static str) -> Node {
    Node::Terminal(Terminal::Literal(text))
}

pub fn hex() -> Node {
    Node::Terminal(Terminal::HexDigit)
}

pub fn sep() -> Node {
    Node::Terminal(Terminal::Separator)
}

pub fn not_ahead(text: &'static str) -> Node {
    Node::Terminal(Terminal::NotAhead(text))
}

pub fn state(id: StateId) -> Node {
    Node::State(id)
}

pub fn bind(name: &'static str, node: Node) -> Node {
    Node::Binder {
        name,
        node: Box::new(node),
    }
}

#[derive(Debug, Clone)]
struct State {
    alternatives: Vec<Vec<Node>>,
}

#[derive(Debug, Clone, Default)]
pub struct Grammar {
    states: Vec<State>,
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a state so it can be referenced before it is defined.
    pub fn declare(&mut self) -> StateId {
        self.states.push(State {
            alternatives: Vec::new(),
        });
        self.states.len() - 1
    }

    /// Set the alternatives of a declared state.
    pub fn define(&mut self, id: StateId, alternatives: Vec<Vec<Node>>) {
        if let Some(state) = self.states.get_mut(id) {
            state.alternatives = alternatives;
        }
    }

    /// Try to match `start` against `text` beginning at byte offset `from`.
    ///
    /// The match does not need to reach the end of `text`.
    pub fn match_at(&self, start: StateId, text: &str, from: usize) -> Option<Match> {
        let mut machine = Machine {
            grammar: self,
            text,
            pos: from,
            work: Vec::new(),
            scopes: vec![Bindings::default()],
            choices: Vec::new(),
        };

        if !machine.enter(start, 0) {
            return None;
        }

        loop {
            let Some(item) = machine.work.pop() else {
                let bindings = machine.scopes.pop().unwrap_or_default();
                return Some(Match {
                    span: from..machine.pos,
                    bindings,
                });
            };
            if !machine.step(item) && !machine.backtrack() {
                return None;
            }
        }
    }
}

/// A named capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub span: Range<usize>,
    pub children: Bindings,
}

/// Captures made at one nesting level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    entries: Vec<(&'static str, Binding)>,
}

impl Bindings {
    fn insert(&mut self, name: &'static str, binding: Binding) {
        self.entries.push((name, binding));
    }

    /// The latest capture under `name`.
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, b)| b)
    }

    /// The captured text for `name`, sliced out of `line`.
    pub fn text<'t>(&self, name: &str, line: &'t str) -> Option<&'t str> {
        self.get(name).and_then(|b| line.get(b.span.clone()))
    }

    /// The captures made inside the binder `name`.
    pub fn nested(&self, name: &str) -> Option<&Bindings> {
        self.get(name).map(|b| &b.children)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub span: Range<usize>,
    pub bindings: Bindings,
}

#[derive(Debug, Clone, Copy)]
enum Work<'g> {
    Node(&'g Node),
    Close { name: &'static str, start: usize },
}

struct ChoicePoint<'g> {
    state: StateId,
    next_alt: usize,
    pos: usize,
    work: Vec<Work<'g>>,
    scopes: Vec<Bindings>,
}

struct Machine<'g, 't> {
    grammar: &'g Grammar,
    text: &'t str,
    pos: usize,
    work: Vec<Work<'g>>,
    scopes: Vec<Bindings>,
    choices: Vec<ChoicePoint<'g>>,
}

impl<'g> Machine<'g, '_> {
    /// Queue alternative `alt` of `state`, leaving a choice point for the next one.
    fn enter(&mut self, state: StateId, alt: usize) -> bool {
        let grammar = self.grammar;
        let Some(alternatives) = grammar.states.get(state).map(|s| &s.alternatives) else {
            return false;
        };
        let Some(sequence) = alternatives.get(alt) else {
            return false;
        };
        if alt + 1 < alternatives.len() {
            self.choices.push(ChoicePoint {
                state,
                next_alt: alt + 1,
                pos: self.pos,
                work: self.work.clone(),
                scopes: self.scopes.clone(),
            });
        }
        self.work.extend(sequence.iter().rev().map(Work::Node));
        true
    }

    fn step(&mut self, item: Work<'g>) -> bool {
        match item {
            Work::Node(Node::Terminal(terminal)) => {
                let rest = self.text.get(self.pos..).unwrap_or("");
                match terminal.match_len(rest) {
                    Some(len) => {
                        self.pos += len;
                        true
                    }
                    None => false,
                }
            }
            Work::Node(Node::State(id)) => self.enter(*id, 0),
            Work::Node(Node::Binder { name, node }) => {
                self.scopes.push(Bindings::default());
                self.work.push(Work::Close {
                    name: *name,
                    start: self.pos,
                });
                self.work.push(Work::Node(node.as_ref()));
                true
            }
            Work::Close { name, start } => {
                let children = self.scopes.pop().unwrap_or_default();
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(
                        name,
                        Binding {
                            span: start..self.pos,
                            children,
                        },
                    );
                }
                true
            }
        }
    }

    /// Resume from the most recent choice point.
    fn backtrack(&mut self) -> bool {
        while let Some(choice) = self.choices.pop() {
            self.pos = choice.pos;
            self.work = choice.work;
            self.scopes = choice.scopes;
            if self.enter(choice.state, choice.next_alt) {
                return true;
            }
        }
        false
    }
}
