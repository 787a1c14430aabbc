use crate::toolkit::error::ConfigError;
use crate::toolkit::lexer::{Terminal, Token, TokenKind};
use crate::toolkit::scanner::anchored;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// How a grammar element matches a token: by terminal kind, or by literal
/// text for the anonymous punctuation/keyword terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenMatcher<K> {
    ByKind(K),
    ByValue(&'static str),
}

impl<K: TokenKind> TokenMatcher<K> {
    pub fn matches(&self, token: &Token<K>) -> bool {
        match self {
            Self::ByKind(kind) => token.kind == Some(*kind),
            Self::ByValue(value) => token.value == *value,
        }
    }
}

impl<K: TokenKind> fmt::Display for TokenMatcher<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByKind(kind) => write!(f, "{kind:?}"),
            Self::ByValue(value) => write!(f, "{value:?}"),
        }
    }
}

/// A symbol on the right-hand side of a grammar rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol<K, P> {
    /// A nonterminal.
    Production(P),
    /// A terminal registered under a kind.
    Terminal(K),
    /// An anonymous string terminal, matched by value.
    Literal(&'static str),
}

/// The boundary a production handler is invoked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStep {
    Start,
    Finish,
}

/// An error reported by a production or terminal handler; the driver logs it
/// against the current production and source line and keeps parsing.
#[derive(Debug)]
pub struct RuleError {
    pub message: String,
}

impl<S: Into<String>> From<S> for RuleError {
    fn from(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The types a grammar is written against: terminal kinds, production
/// symbols, the per-production data frame, and the state shared by all
/// handlers.
pub trait Language {
    type Kind: TokenKind;
    type Prod: Copy + Eq + Hash + fmt::Debug + 'static;
    /// Per-production data; the bottom of the frame stack is the root
    /// accumulator handed to the outermost production.
    type Frame: Default;
    /// Shared state threaded through every handler invocation.
    type Context<'a>;
}

/// Invoked at the start and finish of each instance of a production, with the
/// parent frame and the production's own frame.
pub type ProductionHandler<L> = for<'a> fn(
    &mut <L as Language>::Context<'a>,
    HandlerStep,
    &mut <L as Language>::Frame,
    &mut <L as Language>::Frame,
) -> Result<(), RuleError>;

/// Invoked once per matched token, with the production that consumed it and
/// the innermost handled frame.
pub type TerminalHandler<L> = for<'a> fn(
    &mut <L as Language>::Context<'a>,
    <L as Language>::Prod,
    &Token<<L as Language>::Kind>,
    &mut <L as Language>::Frame,
) -> Result<(), RuleError>;

/// A set of token representations, used for branch selection and for the
/// FIRST/FOLLOW sets driving panic-mode recovery.
#[derive(Debug, Clone)]
pub struct TokenSet<K> {
    kinds: HashSet<K>,
    values: HashSet<&'static str>,
    eof: bool,
}

impl<K> Default for TokenSet<K> {
    fn default() -> Self {
        Self {
            kinds: HashSet::new(),
            values: HashSet::new(),
            eof: false,
        }
    }
}

impl<K: TokenKind> TokenSet<K> {
    pub fn contains(&self, token: &Token<K>) -> bool {
        token.kind.is_some_and(|k| self.kinds.contains(&k))
            || self.values.contains(token.value.as_str())
    }

    pub fn contains_eof(&self) -> bool {
        self.eof
    }

    fn insert_kind(&mut self, kind: K) -> bool {
        self.kinds.insert(kind)
    }

    fn insert_value(&mut self, value: &'static str) -> bool {
        self.values.insert(value)
    }

    fn insert_eof(&mut self) -> bool {
        !std::mem::replace(&mut self.eof, true)
    }

    pub(crate) fn merge(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for kind in &other.kinds {
            changed |= self.insert_kind(*kind);
        }
        for value in &other.values {
            changed |= self.insert_value(*value);
        }
        if other.eof {
            changed |= self.insert_eof();
        }
        changed
    }

    /// A deterministic listing for error messages.
    pub fn describe(&self) -> String {
        let mut entries: Vec<String> = self
            .kinds
            .iter()
            .map(|k| format!("{k:?}"))
            .chain(self.values.iter().map(|v| format!("{v:?}")))
            .collect();
        entries.sort();
        if self.eof {
            entries.push("EOF".to_owned());
        }
        entries.join(", ")
    }
}

/// One row of the branch table: the expansion to use for each lookahead
/// representation, plus the nullable (ε) marker.
pub(crate) struct BranchRow<K, P> {
    by_kind: HashMap<K, Vec<Symbol<K, P>>>,
    by_value: HashMap<&'static str, Vec<Symbol<K, P>>>,
    pub(crate) nullable: bool,
}

impl<K, P> Default for BranchRow<K, P> {
    fn default() -> Self {
        Self {
            by_kind: HashMap::new(),
            by_value: HashMap::new(),
            nullable: false,
        }
    }
}

impl<K: TokenKind, P> BranchRow<K, P> {
    pub(crate) fn lookup(&self, token: &Token<K>) -> Option<&Vec<Symbol<K, P>>> {
        match token.kind {
            Some(kind) => self.by_kind.get(&kind),
            None => self.by_value.get(token.value.as_str()),
        }
    }
}

/// A frozen grammar: the ordered terminal table, the branch/FIRST/FOLLOW
/// tables, and the registered handlers. Built once by [`GrammarBuilder`] and
/// shared by every parse.
pub struct Grammar<L: Language> {
    pub(crate) terminals: Vec<Terminal<L::Kind>>,
    pub(crate) whitespace: Regex,
    pub(crate) comment: Regex,
    pub(crate) start: L::Prod,
    pub(crate) branch: HashMap<L::Prod, BranchRow<L::Kind, L::Prod>>,
    pub(crate) first: HashMap<L::Prod, TokenSet<L::Kind>>,
    pub(crate) follow: HashMap<L::Prod, TokenSet<L::Kind>>,
    pub(crate) production_handlers: HashMap<L::Prod, ProductionHandler<L>>,
    pub(crate) terminal_handlers: HashMap<Option<L::Kind>, TerminalHandler<L>>,
    pub(crate) recover_patterns: HashMap<L::Prod, Regex>,
}

impl<L: Language> Grammar<L> {
    pub fn start(&self) -> L::Prod {
        self.start
    }
}

struct TerminalSpec<K> {
    kind: Option<K>,
    pattern: String,
    unescape: bool,
}

/// Collects terminals (ordered), grammar rules, and handlers, then freezes
/// them into a [`Grammar`]: rules are checked for well-formedness, the
/// NULLABLE/FIRST/FOLLOW sets are computed by fixpoint, and the LL(1) branch
/// table is derived, rejecting ambiguous grammars.
#[must_use]
pub struct GrammarBuilder<L: Language> {
    terminals: Vec<TerminalSpec<L::Kind>>,
    whitespace: String,
    comment: String,
    rules: Vec<(L::Prod, Vec<Vec<Symbol<L::Kind, L::Prod>>>)>,
    start: Option<L::Prod>,
    production_handlers: HashMap<L::Prod, ProductionHandler<L>>,
    terminal_handlers: HashMap<Option<L::Kind>, TerminalHandler<L>>,
    recover_specs: Vec<(L::Prod, String)>,
}

impl<L: Language> Default for GrammarBuilder<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Language> GrammarBuilder<L> {
    pub fn new() -> Self {
        Self {
            terminals: Vec::new(),
            whitespace: r"[\x20\x09\x0D\x0A]+".to_owned(),
            comment: r"#[^\x0A\x0D]*".to_owned(),
            rules: Vec::new(),
            start: None,
            production_handlers: HashMap::new(),
            terminal_handlers: HashMap::new(),
            recover_specs: Vec::new(),
        }
    }

    pub fn whitespace(mut self, pattern: &str) -> Self {
        pattern.clone_into(&mut self.whitespace);
        self
    }

    pub fn comment(mut self, pattern: &str) -> Self {
        pattern.clone_into(&mut self.comment);
        self
    }

    /// Registers a terminal; priority is registration order. A `None` kind
    /// declares the anonymous punctuation/keyword terminal whose tokens are
    /// matched by value.
    pub fn terminal(mut self, kind: Option<L::Kind>, pattern: &str, unescape: bool) -> Self {
        self.terminals.push(TerminalSpec {
            kind,
            pattern: pattern.to_owned(),
            unescape,
        });
        self
    }

    /// Registers the callback invoked for each token of `kind`; a `None` kind
    /// catches all anonymous string terminals.
    pub fn on_terminal(mut self, kind: Option<L::Kind>, handler: TerminalHandler<L>) -> Self {
        self.terminal_handlers.insert(kind, handler);
        self
    }

    /// Registers the callback invoked at the start and finish of every
    /// instance of `production`.
    pub fn on_production(mut self, production: L::Prod, handler: ProductionHandler<L>) -> Self {
        self.production_handlers.insert(production, handler);
        self
    }

    /// Declares a resynchronization pattern for `production`: when panic-mode
    /// recovery abandons an instance of it, the current lookahead is dropped
    /// and input matching the pattern is skipped before parsing resumes.
    pub fn recover_to(mut self, production: L::Prod, pattern: &str) -> Self {
        self.recover_specs.push((production, pattern.to_owned()));
        self
    }

    /// Adds the rule `production → alt₀ | alt₁ | …`; an empty alternative is ε.
    pub fn rule(mut self, production: L::Prod, alternatives: &[&[Symbol<L::Kind, L::Prod>]]) -> Self {
        self.rules.push((
            production,
            alternatives.iter().map(|alt| alt.to_vec()).collect(),
        ));
        self
    }

    pub fn start(mut self, production: L::Prod) -> Self {
        self.start = Some(production);
        self
    }

    pub fn build(self) -> Result<Grammar<L>, ConfigError> {
        if self.terminals.is_empty() {
            return Err(ConfigError::NoTerminals);
        }
        if self.rules.is_empty() {
            return Err(ConfigError::NoRules);
        }
        let start = self
            .start
            .ok_or_else(|| ConfigError::UnknownStart("<unset>".to_owned()))?;
        let defined: HashSet<L::Prod> = self.rules.iter().map(|(p, _)| *p).collect();
        if !defined.contains(&start) {
            return Err(ConfigError::UnknownStart(format!("{start:?}")));
        }
        let registered: HashSet<L::Kind> =
            self.terminals.iter().filter_map(|t| t.kind).collect();
        for (production, alternatives) in &self.rules {
            for alternative in alternatives {
                for symbol in alternative {
                    match symbol {
                        Symbol::Terminal(kind) if !registered.contains(kind) => {
                            return Err(ConfigError::UnknownTerminal {
                                production: format!("{production:?}"),
                                terminal: format!("{kind:?}"),
                            });
                        }
                        Symbol::Production(p) if !defined.contains(p) => {
                            return Err(ConfigError::UnknownStart(format!("{p:?}")));
                        }
                        _ => {}
                    }
                }
            }
        }

        let terminals = self
            .terminals
            .iter()
            .map(|t| Terminal::new(t.kind, &t.pattern, t.unescape))
            .collect::<Result<Vec<_>, _>>()?;
        let whitespace = compile_filler(&self.whitespace)?;
        let comment = compile_filler(&self.comment)?;
        let mut recover_patterns = HashMap::new();
        for (production, pattern) in &self.recover_specs {
            recover_patterns.insert(*production, compile_filler(pattern)?);
        }

        let nullable = compute_nullable(&self.rules);
        let first = compute_first(&self.rules, &nullable);
        let follow = compute_follow(&self.rules, &nullable, &first, start);
        let branch = compute_branch(&self.rules, &nullable, &first)?;

        Ok(Grammar {
            terminals,
            whitespace,
            comment,
            start,
            branch,
            first,
            follow,
            production_handlers: self.production_handlers,
            terminal_handlers: self.terminal_handlers,
            recover_patterns,
        })
    }
}

fn compile_filler(pattern: &str) -> Result<Regex, ConfigError> {
    anchored(pattern).map_err(|e| ConfigError::Pattern {
        pattern: pattern.to_owned(),
        message: e.to_string(),
    })
}

type Rules<K, P> = [(P, Vec<Vec<Symbol<K, P>>>)];

fn compute_nullable<K: TokenKind, P: Copy + Eq + Hash>(rules: &Rules<K, P>) -> HashSet<P> {
    let mut nullable = HashSet::new();
    loop {
        let mut changed = false;
        for (production, alternatives) in rules {
            if nullable.contains(production) {
                continue;
            }
            let derives_empty = alternatives.iter().any(|alt| {
                alt.iter().all(|symbol| match symbol {
                    Symbol::Production(p) => nullable.contains(p),
                    Symbol::Terminal(_) | Symbol::Literal(_) => false,
                })
            });
            if derives_empty {
                nullable.insert(*production);
                changed = true;
            }
        }
        if !changed {
            return nullable;
        }
    }
}

/// FIRST of a symbol sequence; the boolean reports whether the whole
/// sequence can derive ε.
fn first_of_sequence<K: TokenKind, P: Copy + Eq + Hash>(
    sequence: &[Symbol<K, P>],
    nullable: &HashSet<P>,
    first: &HashMap<P, TokenSet<K>>,
) -> (TokenSet<K>, bool) {
    let mut set = TokenSet::default();
    for symbol in sequence {
        match symbol {
            Symbol::Terminal(kind) => {
                set.insert_kind(*kind);
                return (set, false);
            }
            Symbol::Literal(value) => {
                set.insert_value(*value);
                return (set, false);
            }
            Symbol::Production(p) => {
                if let Some(first_p) = first.get(p) {
                    set.merge(first_p);
                }
                if !nullable.contains(p) {
                    return (set, false);
                }
            }
        }
    }
    (set, true)
}

fn compute_first<K: TokenKind, P: Copy + Eq + Hash>(
    rules: &Rules<K, P>,
    nullable: &HashSet<P>,
) -> HashMap<P, TokenSet<K>> {
    let mut first: HashMap<P, TokenSet<K>> = HashMap::new();
    for (production, _) in rules {
        first.entry(*production).or_default();
    }
    loop {
        let mut changed = false;
        for (production, alternatives) in rules {
            let mut addition = TokenSet::default();
            for alternative in alternatives {
                let (set, _) = first_of_sequence(alternative, nullable, &first);
                addition.merge(&set);
            }
            if let Some(entry) = first.get_mut(production) {
                changed |= entry.merge(&addition);
            }
        }
        if !changed {
            return first;
        }
    }
}

fn compute_follow<K: TokenKind, P: Copy + Eq + Hash>(
    rules: &Rules<K, P>,
    nullable: &HashSet<P>,
    first: &HashMap<P, TokenSet<K>>,
    start: P,
) -> HashMap<P, TokenSet<K>> {
    let mut follow: HashMap<P, TokenSet<K>> = HashMap::new();
    for (production, _) in rules {
        follow.entry(*production).or_default();
    }
    if let Some(entry) = follow.get_mut(&start) {
        entry.insert_eof();
    }
    loop {
        let mut changed = false;
        for (production, alternatives) in rules {
            for alternative in alternatives {
                for (i, symbol) in alternative.iter().enumerate() {
                    let Symbol::Production(p) = symbol else {
                        continue;
                    };
                    let (trailer_first, trailer_nullable) =
                        first_of_sequence(&alternative[i + 1..], nullable, first);
                    let mut addition = trailer_first;
                    if trailer_nullable {
                        if let Some(follow_production) = follow.get(production) {
                            addition.merge(&follow_production.clone());
                        }
                    }
                    if let Some(entry) = follow.get_mut(p) {
                        changed |= entry.merge(&addition);
                    }
                }
            }
        }
        if !changed {
            return follow;
        }
    }
}

fn compute_branch<K: TokenKind, P: Copy + Eq + Hash + fmt::Debug>(
    rules: &Rules<K, P>,
    nullable: &HashSet<P>,
    first: &HashMap<P, TokenSet<K>>,
) -> Result<HashMap<P, BranchRow<K, P>>, ConfigError> {
    let mut branch: HashMap<P, BranchRow<K, P>> = HashMap::new();
    for (production, alternatives) in rules {
        let row = branch.entry(*production).or_default();
        for alternative in alternatives {
            let (alt_first, alt_nullable) = first_of_sequence(alternative, nullable, first);
            for kind in &alt_first.kinds {
                if row
                    .by_kind
                    .insert(*kind, alternative.clone())
                    .is_some()
                {
                    return Err(ConfigError::Ambiguous {
                        production: format!("{production:?}"),
                        token: format!("{kind:?}"),
                    });
                }
            }
            for value in &alt_first.values {
                if row
                    .by_value
                    .insert(*value, alternative.clone())
                    .is_some()
                {
                    return Err(ConfigError::Ambiguous {
                        production: format!("{production:?}"),
                        token: format!("{value:?}"),
                    });
                }
            }
            if alt_nullable {
                if row.nullable {
                    return Err(ConfigError::Ambiguous {
                        production: format!("{production:?}"),
                        token: "ε".to_owned(),
                    });
                }
                row.nullable = true;
            }
        }
    }
    Ok(branch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Ident,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Prod {
        Doc,
        Item,
    }

    struct Toy;

    impl Language for Toy {
        type Kind = Kind;
        type Prod = Prod;
        type Frame = ();
        type Context<'a> = ();
    }

    fn builder() -> GrammarBuilder<Toy> {
        GrammarBuilder::new()
            .terminal(Some(Kind::Ident), "[a-z]+", false)
            .terminal(None, r"[()]", false)
            .rule(
                Prod::Doc,
                &[
                    &[Symbol::Production(Prod::Item), Symbol::Production(Prod::Doc)],
                    &[],
                ],
            )
            .rule(
                Prod::Item,
                &[
                    &[Symbol::Terminal(Kind::Ident)],
                    &[
                        Symbol::Literal("("),
                        Symbol::Production(Prod::Doc),
                        Symbol::Literal(")"),
                    ],
                ],
            )
            .start(Prod::Doc)
    }

    fn token(kind: Option<Kind>, value: &str) -> Token<Kind> {
        Token {
            kind,
            value: value.to_owned(),
            lineno: 1,
        }
    }

    #[test]
    fn builds_branch_and_recovery_tables() {
        let grammar = builder().build().unwrap();
        let row = &grammar.branch[&Prod::Doc];
        assert!(row.nullable);
        assert!(row.lookup(&token(Some(Kind::Ident), "ab")).is_some());
        assert!(row.lookup(&token(None, "(")).is_some());
        assert!(row.lookup(&token(None, ")")).is_none());
        assert!(grammar.first[&Prod::Item].contains(&token(None, "(")));
        assert!(grammar.follow[&Prod::Doc].contains(&token(None, ")")));
        assert!(grammar.follow[&Prod::Doc].contains_eof());
    }

    #[test]
    fn missing_pieces_are_config_errors() {
        assert!(matches!(
            GrammarBuilder::<Toy>::new()
                .rule(Prod::Doc, &[&[]])
                .start(Prod::Doc)
                .build(),
            Err(ConfigError::NoTerminals)
        ));
        assert!(matches!(
            GrammarBuilder::<Toy>::new()
                .terminal(Some(Kind::Ident), "[a-z]+", false)
                .start(Prod::Doc)
                .build(),
            Err(ConfigError::NoRules)
        ));
        assert!(matches!(
            GrammarBuilder::<Toy>::new()
                .terminal(Some(Kind::Ident), "[a-z]+", false)
                .rule(Prod::Doc, &[&[Symbol::Terminal(Kind::Ident)]])
                .build(),
            Err(ConfigError::UnknownStart(_))
        ));
    }

    #[test]
    fn ambiguous_grammars_are_rejected() {
        let result = GrammarBuilder::<Toy>::new()
            .terminal(Some(Kind::Ident), "[a-z]+", false)
            .rule(
                Prod::Doc,
                &[
                    &[Symbol::Terminal(Kind::Ident)],
                    &[Symbol::Terminal(Kind::Ident), Symbol::Terminal(Kind::Ident)],
                ],
            )
            .start(Prod::Doc)
            .build();
        assert!(matches!(result, Err(ConfigError::Ambiguous { .. })));
    }

    #[test]
    fn bad_patterns_are_config_errors() {
        let result = GrammarBuilder::<Toy>::new()
            .terminal(Some(Kind::Ident), "[unclosed", false)
            .rule(Prod::Doc, &[&[Symbol::Terminal(Kind::Ident)]])
            .start(Prod::Doc)
            .build();
        assert!(matches!(result, Err(ConfigError::Pattern { .. })));
    }
}
