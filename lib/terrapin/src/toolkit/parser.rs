use crate::toolkit::error::{ConfigError, LexerError, ParseError, Violation};
use crate::toolkit::grammar::{
    Grammar, HandlerStep, Language, RuleError, Symbol, TokenMatcher, TokenSet,
};
use crate::toolkit::lexer::{Lexer, Token};
use std::collections::VecDeque;

/// Options for a single parse run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Abort on the first violation instead of recovering and accumulating.
    pub validate: bool,
}

/// Raised internally when `validate` stops the parse at the first violation.
struct Halt;

/// What the branch selection step decided for the production on top of the
/// stack.
enum Selection<L: Language> {
    /// Expand using this rule alternative.
    Sequence(VecDeque<Symbol<L::Kind, L::Prod>>),
    /// The production is nullable and the lookahead belongs to an ancestor.
    Empty,
    /// The recovery signal: panic mode hit a token in the follow union, the
    /// production is abandoned and the stack unwinds.
    Recover,
    Eof,
}

/// How a pending term was disposed of while the stack unwinds in recovery.
enum Resync<P> {
    /// The lookahead matched the term; normal parsing resumes.
    Consumed,
    /// The lookahead can start this nonterminal; descend into it.
    Descend(P),
    /// The term is abandoned.
    Dropped,
}

/// The table-driven LL(1) driver.
///
/// One instance owns its lexer and its production/frame stacks for the
/// duration of a single [`parse`](Self::parse) call; handlers run
/// synchronously on the caller's thread.
pub struct Parser<'a, L: Language> {
    grammar: &'a Grammar<L>,
    lexer: Lexer<'a, L::Kind>,
    todo: Vec<TodoFrame<L>>,
    frames: Vec<L::Frame>,
    violations: Vec<Violation>,
    recovering: bool,
    validate: bool,
}

struct TodoFrame<L: Language> {
    prod: L::Prod,
    /// `None` until the branch table picked an expansion.
    terms: Option<VecDeque<Symbol<L::Kind, L::Prod>>>,
    /// Whether this production pushed onto the frame stack.
    has_frame: bool,
}

impl<'a, L: Language> Parser<'a, L> {
    pub fn new(grammar: &'a Grammar<L>, input: &'a str) -> Result<Self, ConfigError> {
        Ok(Self {
            lexer: Lexer::new(
                input,
                &grammar.terminals,
                &grammar.whitespace,
                &grammar.comment,
            )?,
            grammar,
            todo: Vec::new(),
            frames: vec![L::Frame::default()],
            violations: Vec::new(),
            recovering: false,
            validate: false,
        })
    }

    /// Drives the grammar to completion over the input, firing production and
    /// terminal handlers as it goes. Violations accumulate and are raised as
    /// one aggregated error at the end, unless `validate` aborts at the first.
    pub fn parse(
        mut self,
        ctx: &mut L::Context<'_>,
        options: &ParseOptions,
    ) -> Result<(), ParseError> {
        self.validate = options.validate;
        let outcome = self.run(ctx);
        match outcome {
            Ok(()) if self.violations.is_empty() => Ok(()),
            Ok(()) | Err(Halt) => Err(ParseError::new(self.violations)),
        }
    }

    fn run(&mut self, ctx: &mut L::Context<'_>) -> Result<(), Halt> {
        self.push_production(ctx, self.grammar.start)?;
        'frames: while !self.todo.is_empty() {
            if self.todo.last().is_some_and(|top| top.terms.is_none()) {
                let Some(prod) = self.todo.last().map(|top| top.prod) else {
                    break;
                };
                let selection = self.select(ctx, prod)?;
                let Some(top) = self.todo.last_mut() else {
                    break;
                };
                match selection {
                    Selection::Sequence(sequence) => top.terms = Some(sequence),
                    Selection::Empty | Selection::Recover => top.terms = Some(VecDeque::new()),
                    Selection::Eof => break 'frames,
                }
            }
            let mut descended = false;
            while let Some(symbol) = self.peek_term() {
                if self.recovering {
                    match self.resync(ctx, symbol)? {
                        Resync::Consumed | Resync::Dropped => self.pop_term(),
                        Resync::Descend(p) => {
                            self.pop_term();
                            self.push_production(ctx, p)?;
                            descended = true;
                            break;
                        }
                    }
                    continue;
                }
                match symbol {
                    Symbol::Production(p) => {
                        self.pop_term();
                        self.push_production(ctx, p)?;
                        descended = true;
                        break;
                    }
                    Symbol::Terminal(kind) => {
                        self.consume_terminal(ctx, TokenMatcher::ByKind(kind))?;
                    }
                    Symbol::Literal(value) => {
                        self.consume_terminal(ctx, TokenMatcher::ByValue(value))?;
                    }
                }
            }
            if descended {
                continue;
            }
            self.close(ctx)?;
        }

        // Premature EOF: unwind whatever is still open, reporting the first
        // frame that provably misses required input.
        let mut eof_reported = false;
        while !self.todo.is_empty() {
            if !eof_reported && self.top_misses_required_input() {
                eof_reported = true;
                let production = self
                    .todo
                    .last()
                    .map_or_else(String::new, |top| format!("{:?}", top.prod));
                let lineno = self.lexer.lineno();
                self.record(Violation {
                    production,
                    token: None,
                    lineno,
                    message: "unexpected end of file".to_owned(),
                })?;
            }
            self.close(ctx)?;
        }

        // The grammar completed but the lexer still reports tokens.
        if let Some(token) = self.peek_token()? {
            self.record(Violation {
                production: format!("{:?}", self.grammar.start),
                token: Some(token.value.clone()),
                lineno: token.lineno,
                message: "finished processing before end of file".to_owned(),
            })?;
        }
        Ok(())
    }

    /// Branch selection with panic-mode recovery: peek a token, look it up in
    /// the branch table, and on failure discard tokens until one restarts
    /// this production (resume) or belongs to the follow union of the open
    /// productions (recover signal).
    fn select(&mut self, _ctx: &mut L::Context<'_>, prod: L::Prod) -> Result<Selection<L>, Halt> {
        loop {
            let Some(token) = self.peek_token()? else {
                return Ok(Selection::Eof);
            };
            if !self.recovering {
                let row = self.grammar.branch.get(&prod);
                if let Some(sequence) = row.and_then(|row| row.lookup(&token)) {
                    return Ok(Selection::Sequence(sequence.iter().copied().collect()));
                }
                if row.is_some_and(|row| row.nullable) {
                    return Ok(Selection::Empty);
                }
                let expected = self
                    .grammar
                    .first
                    .get(&prod)
                    .map_or_else(String::new, TokenSet::describe);
                self.record(Violation {
                    production: format!("{prod:?}"),
                    token: Some(token.value.clone()),
                    lineno: token.lineno,
                    message: format!("unexpected token {:?}, expected one of {expected}", token.value),
                })?;
                self.recovering = true;
            }
            let follow_union = self.follow_union();
            loop {
                let Some(token) = self.peek_token()? else {
                    return Ok(Selection::Eof);
                };
                // Resume through the branch table so the retried lookup in
                // the outer loop is guaranteed to succeed.
                if self
                    .grammar
                    .branch
                    .get(&prod)
                    .is_some_and(|row| row.lookup(&token).is_some())
                {
                    self.recovering = false;
                    break;
                }
                if follow_union.contains(&token) {
                    return Ok(Selection::Recover);
                }
                self.discard_token()?;
            }
        }
    }

    /// Accepts the lookahead against a required terminal, entering recovery on
    /// mismatch: tokens are discarded until the terminal shows up (consume it
    /// and go on) or a follow-union token appears (abandon the terminal and
    /// unwind).
    fn consume_terminal(
        &mut self,
        ctx: &mut L::Context<'_>,
        matcher: TokenMatcher<L::Kind>,
    ) -> Result<(), Halt> {
        let Some(token) = self.peek_token()? else {
            let production = self
                .todo
                .last()
                .map_or_else(String::new, |top| format!("{:?}", top.prod));
            let lineno = self.lexer.lineno();
            self.record(Violation {
                production,
                token: None,
                lineno,
                message: format!("unexpected end of file, expected {matcher}"),
            })?;
            self.pop_term();
            self.recovering = true;
            return Ok(());
        };
        if matcher.matches(&token) {
            self.pop_term();
            self.shift_and_dispatch(ctx)?;
            return Ok(());
        }
        self.record(Violation {
            production: self
                .todo
                .last()
                .map_or_else(String::new, |top| format!("{:?}", top.prod)),
            token: Some(token.value.clone()),
            lineno: token.lineno,
            message: format!("expected {matcher}, found {:?}", token.value),
        })?;
        let follow_union = self.follow_union();
        loop {
            let Some(token) = self.peek_token()? else {
                self.pop_term();
                self.recovering = true;
                return Ok(());
            };
            if matcher.matches(&token) {
                self.pop_term();
                self.shift_and_dispatch(ctx)?;
                return Ok(());
            }
            if follow_union.contains(&token) {
                self.pop_term();
                self.recovering = true;
                return Ok(());
            }
            self.discard_token()?;
        }
    }

    /// While unwinding, decides whether the lookahead lets a pending term
    /// resume normal parsing.
    fn resync(
        &mut self,
        ctx: &mut L::Context<'_>,
        symbol: Symbol<L::Kind, L::Prod>,
    ) -> Result<Resync<L::Prod>, Halt> {
        let Some(token) = self.peek_token()? else {
            return Ok(Resync::Dropped);
        };
        match symbol {
            Symbol::Terminal(kind) if TokenMatcher::ByKind(kind).matches(&token) => {
                self.recovering = false;
                self.shift_and_dispatch(ctx)?;
                Ok(Resync::Consumed)
            }
            Symbol::Literal(value) if TokenMatcher::ByValue(value).matches(&token) => {
                self.recovering = false;
                self.shift_and_dispatch(ctx)?;
                Ok(Resync::Consumed)
            }
            Symbol::Production(p)
                if self
                    .grammar
                    .first
                    .get(&p)
                    .is_some_and(|first| first.contains(&token)) =>
            {
                self.recovering = false;
                Ok(Resync::Descend(p))
            }
            _ => Ok(Resync::Dropped),
        }
    }

    fn push_production(&mut self, ctx: &mut L::Context<'_>, prod: L::Prod) -> Result<(), Halt> {
        let mut has_frame = false;
        if let Some(handler) = self.grammar.production_handlers.get(&prod).copied() {
            let mut current = L::Frame::default();
            let outcome = self
                .frames
                .last_mut()
                .map(|parent| handler(ctx, HandlerStep::Start, parent, &mut current));
            self.frames.push(current);
            has_frame = true;
            if let Some(Err(e)) = outcome {
                self.record_rule(prod, e)?;
            }
        }
        self.todo.push(TodoFrame {
            prod,
            terms: None,
            has_frame,
        });
        Ok(())
    }

    /// Pops the top production and fires its finish handler. An abandoned
    /// production with a `recover_to` pattern resynchronizes the lexer and
    /// ends the unwinding here.
    fn close(&mut self, ctx: &mut L::Context<'_>) -> Result<(), Halt> {
        let Some(frame) = self.todo.pop() else {
            return Ok(());
        };
        if self.recovering {
            if let Some(pattern) = self.grammar.recover_patterns.get(&frame.prod) {
                self.lexer.recover(Some(pattern));
                self.recovering = false;
            }
        }
        if !frame.has_frame {
            return Ok(());
        }
        let Some(mut current) = self.frames.pop() else {
            return Ok(());
        };
        if let Some(handler) = self.grammar.production_handlers.get(&frame.prod).copied() {
            let outcome = self
                .frames
                .last_mut()
                .map(|parent| handler(ctx, HandlerStep::Finish, parent, &mut current));
            if let Some(Err(e)) = outcome {
                self.record_rule(frame.prod, e)?;
            }
        }
        Ok(())
    }

    /// Consumes the cached lookahead and fires the matching terminal handler;
    /// a handler registered under `None` catches anonymous string terminals.
    fn shift_and_dispatch(&mut self, ctx: &mut L::Context<'_>) -> Result<(), Halt> {
        let Ok(Some(token)) = self.lexer.shift() else {
            return Ok(());
        };
        let handler = self.grammar.terminal_handlers.get(&token.kind).copied();
        let Some(handler) = handler else {
            return Ok(());
        };
        let Some(prod) = self.todo.last().map(|top| top.prod) else {
            return Ok(());
        };
        let outcome = self
            .frames
            .last_mut()
            .map(|frame| handler(ctx, prod, &token, frame));
        if let Some(Err(e)) = outcome {
            let lineno = token.lineno;
            self.record(Violation {
                production: format!("{prod:?}"),
                token: Some(token.value),
                lineno,
                message: e.message,
            })?;
        }
        Ok(())
    }

    fn peek_term(&self) -> Option<Symbol<L::Kind, L::Prod>> {
        self.todo.last()?.terms.as_ref()?.front().copied()
    }

    fn pop_term(&mut self) {
        if let Some(terms) = self.todo.last_mut().and_then(|top| top.terms.as_mut()) {
            terms.pop_front();
        }
    }

    /// Peeks the lookahead, logging lexer errors and resynchronizing the
    /// lexer until it produces a token or reaches EOF.
    fn peek_token(&mut self) -> Result<Option<Token<L::Kind>>, Halt> {
        loop {
            match self.lexer.first() {
                Ok(token) => return Ok(token.cloned()),
                Err(e) => {
                    self.record_lexer(e)?;
                    self.lexer.recover(None);
                }
            }
        }
    }

    fn discard_token(&mut self) -> Result<(), Halt> {
        match self.lexer.shift() {
            Ok(_) => Ok(()),
            Err(e) => {
                self.record_lexer(e)?;
                self.lexer.recover(None);
                Ok(())
            }
        }
    }

    fn follow_union(&self) -> TokenSet<L::Kind> {
        let mut union = TokenSet::default();
        for frame in &self.todo {
            if let Some(follow) = self.grammar.follow.get(&frame.prod) {
                union.merge(follow);
            }
        }
        union
    }

    fn top_misses_required_input(&self) -> bool {
        let Some(top) = self.todo.last() else {
            return false;
        };
        match &top.terms {
            Some(terms) => terms
                .iter()
                .any(|s| matches!(s, Symbol::Terminal(_) | Symbol::Literal(_))),
            None => !self
                .grammar
                .branch
                .get(&top.prod)
                .is_some_and(|row| row.nullable),
        }
    }

    fn record(&mut self, violation: Violation) -> Result<(), Halt> {
        self.violations.push(violation);
        if self.validate { Err(Halt) } else { Ok(()) }
    }

    fn record_lexer(&mut self, error: LexerError) -> Result<(), Halt> {
        let production = self
            .todo
            .last()
            .map_or_else(String::new, |top| format!("{:?}", top.prod));
        self.record(Violation {
            production,
            token: Some(error.offending_token.clone()),
            lineno: error.lineno,
            message: error.to_string(),
        })
    }

    fn record_rule(&mut self, prod: L::Prod, error: RuleError) -> Result<(), Halt> {
        let lineno = self.lexer.lineno();
        self.record(Violation {
            production: format!("{prod:?}"),
            token: None,
            lineno,
            message: error.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::grammar::GrammarBuilder;

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
        type Context<'a> = Vec<String>;
    }

    fn collect_ident(
        ctx: &mut Vec<String>,
        _prod: Prod,
        token: &Token<Kind>,
        _frame: &mut (),
    ) -> Result<(), RuleError> {
        ctx.push(token.value.clone());
        Ok(())
    }

    fn mark_item(
        ctx: &mut Vec<String>,
        step: HandlerStep,
        _parent: &mut (),
        _current: &mut (),
    ) -> Result<(), RuleError> {
        ctx.push(match step {
            HandlerStep::Start => "<".to_owned(),
            HandlerStep::Finish => ">".to_owned(),
        });
        Ok(())
    }

    fn grammar(with_marks: bool) -> Grammar<Toy> {
        let mut builder = GrammarBuilder::<Toy>::new()
            .terminal(Some(Kind::Ident), "[a-z]+", false)
            .terminal(None, r"[()]", false)
            .on_terminal(Some(Kind::Ident), collect_ident)
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
            .start(Prod::Doc);
        if with_marks {
            builder = builder.on_production(Prod::Item, mark_item);
        }
        builder.build().unwrap()
    }

    fn parse(grammar: &Grammar<Toy>, input: &str, validate: bool) -> (Vec<String>, Result<(), ParseError>) {
        let mut ctx = Vec::new();
        let parser = Parser::new(grammar, input).unwrap();
        let outcome = parser.parse(&mut ctx, &ParseOptions { validate });
        (ctx, outcome)
    }

    #[test]
    fn drives_nested_productions() {
        let grammar = grammar(false);
        let (ctx, outcome) = parse(&grammar, "a b ( c ( d ) ) e", false);
        assert!(outcome.is_ok());
        assert_eq!(ctx, ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn empty_input_is_accepted_by_a_nullable_start() {
        let grammar = grammar(false);
        let (ctx, outcome) = parse(&grammar, "  # only a comment\n", false);
        assert!(outcome.is_ok());
        assert!(ctx.is_empty());
    }

    #[test]
    fn fires_start_and_finish_per_production_instance() {
        let grammar = grammar(true);
        let (ctx, outcome) = parse(&grammar, "a ( b )", false);
        assert!(outcome.is_ok());
        assert_eq!(ctx, ["<", "a", ">", "<", "<", "b", ">", ">"]);
    }

    #[test]
    fn parses_are_deterministic() {
        let grammar = grammar(false);
        let (first_run, _) = parse(&grammar, "a ( b c ) d", false);
        let (second_run, _) = parse(&grammar, "a ( b c ) d", false);
        assert_eq!(first_run, second_run);
    }

    #[test]
    fn recovers_from_lexer_errors_and_aggregates() {
        let grammar = grammar(false);
        let (ctx, outcome) = parse(&grammar, "a %% b", false);
        let error = outcome.unwrap_err();
        assert_eq!(error.violations().len(), 1);
        assert_eq!(error.violations()[0].lineno, 1);
        assert_eq!(ctx, ["a", "b"]);
    }

    #[test]
    fn validate_aborts_at_the_first_violation() {
        let grammar = grammar(false);
        let (ctx, outcome) = parse(&grammar, "a %% b", true);
        assert_eq!(outcome.unwrap_err().violations().len(), 1);
        assert_eq!(ctx, ["a"]);
    }

    #[test]
    fn premature_eof_is_reported_and_unwinds() {
        let grammar = grammar(true);
        let (ctx, outcome) = parse(&grammar, "( a", false);
        let error = outcome.unwrap_err();
        assert!(error.violations()[0].message.contains("end of file"));
        // Both open productions still saw their finish callback.
        assert_eq!(ctx, ["<", "<", "a", ">", ">"]);
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum PairProd {
        Doc,
        Pair,
    }

    struct Pairs;

    impl Language for Pairs {
        type Kind = Kind;
        type Prod = PairProd;
        type Frame = ();
        type Context<'a> = Vec<String>;
    }

    fn collect_pair_ident(
        ctx: &mut Vec<String>,
        _prod: PairProd,
        token: &Token<Kind>,
        _frame: &mut (),
    ) -> Result<(), RuleError> {
        ctx.push(token.value.clone());
        Ok(())
    }

    fn pair_grammar(recover: bool) -> Grammar<Pairs> {
        let mut builder = GrammarBuilder::<Pairs>::new()
            .terminal(Some(Kind::Ident), "[a-z]+", false)
            .terminal(None, r"[()]", false)
            .on_terminal(Some(Kind::Ident), collect_pair_ident)
            .rule(
                PairProd::Doc,
                &[
                    &[
                        Symbol::Production(PairProd::Pair),
                        Symbol::Production(PairProd::Doc),
                    ],
                    &[],
                ],
            )
            .rule(
                PairProd::Pair,
                &[&[
                    Symbol::Literal("("),
                    Symbol::Terminal(Kind::Ident),
                    Symbol::Literal(")"),
                ]],
            )
            .start(PairProd::Doc);
        if recover {
            builder = builder.recover_to(PairProd::Pair, r"[^()]*\)");
        }
        builder.build().unwrap()
    }

    #[test]
    fn abandoned_production_resumes_at_the_next_start() {
        let grammar = pair_grammar(false);
        let mut ctx = Vec::new();
        let outcome = Parser::new(&grammar, "( ) ( x )")
            .unwrap()
            .parse(&mut ctx, &ParseOptions::default());
        assert!(outcome.is_err());
        assert_eq!(ctx, ["x"]);
    }

    #[test]
    fn recover_to_skips_to_the_production_resync_point() {
        let grammar = pair_grammar(true);
        let mut ctx = Vec::new();
        let outcome = Parser::new(&grammar, "( ) ( x )")
            .unwrap()
            .parse(&mut ctx, &ParseOptions::default());
        assert!(outcome.is_err());
        // The resync pattern swallowed the remainder of the second pair.
        assert!(ctx.is_empty());
    }

    #[test]
    fn resynchronizes_inside_a_nested_production() {
        let grammar = grammar(false);
        let (ctx, outcome) = parse(&grammar, "( a %% b ) c", false);
        assert!(outcome.is_err());
        assert_eq!(ctx, ["a", "b", "c"]);
    }
}
