//! A [Turtle](https://www.w3.org/TR/turtle/) parser implemented by
//! [`TurtleParser`]: the Turtle terminals and grammar wired onto the LL(1)
//! toolkit, producing [`oxrdf`] triples through a caller-supplied sink.

use crate::terminals;
use crate::toolkit::{
    ConfigError, Grammar, GrammarBuilder, HandlerStep, Language, ParseError, ParseOptions, Parser,
    RuleError, Symbol, Token,
};
use oxiri::{Iri, IriParseError};
use oxrdf::vocab::{rdf, xsd};
use oxrdf::{BlankNode, Graph, Literal, NamedNode, Subject, Term, Triple};
use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::LazyLock;

/// The canonical Turtle media type.
pub const MEDIA_TYPE: &str = "text/turtle";
/// Media types seen in the wild for Turtle content.
pub const ALTERNATIVE_MEDIA_TYPES: [&str; 3] =
    ["text/rdf+turtle", "application/turtle", "application/x-turtle"];
/// The usual Turtle file extension.
pub const FILE_EXTENSION: &str = "ttl";

/// A parsing error: I/O, grammar assembly, or accumulated syntax violations.
#[derive(Debug, thiserror::Error)]
pub enum TurtleParseError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Syntax(#[from] ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TurtleTerminal {
    Iriref,
    PnameLn,
    PnameNs,
    BlankNodeLabel,
    Langtag,
    Integer,
    Decimal,
    Double,
    Anon,
    StringLiteralQuote,
    StringLiteralSingleQuote,
    StringLiteralLongQuote,
    StringLiteralLongSingleQuote,
    Prefix,
    Base,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TurtleProduction {
    TurtleDoc,
    Statement,
    Directive,
    PrefixId,
    Base,
    SparqlPrefix,
    SparqlBase,
    Triples,
    PredicateObjectListOpt,
    PredicateObjectList,
    PredicateObjectTail,
    PredicateObjectSemi,
    ObjectList,
    ObjectListTail,
    Verb,
    Predicate,
    Subject,
    Object,
    Literal,
    BlankNodePropertyList,
    Collection,
    CollectionItems,
    NumericLiteral,
    RdfLiteral,
    RdfLiteralSuffix,
    BooleanLiteral,
    StringLit,
    Iri,
    PrefixedName,
    BlankNodeTerm,
}

/// Per-production data, discriminated by the production that owns it.
/// Statements assembled in nested productions bubble upward through these
/// frames until the enclosing `triples` emits them.
#[derive(Debug, Default)]
pub(crate) enum Frame {
    #[default]
    Document,
    PrefixDecl {
        prefix: Option<String>,
        iri: Option<NamedNode>,
    },
    BaseDecl {
        iri: Option<NamedNode>,
    },
    Triples {
        subject: Option<Subject>,
        statements: Vec<Triple>,
    },
    PredicateObjects {
        subject: Option<Subject>,
        predicate: Option<NamedNode>,
        statements: Vec<Triple>,
    },
    Verb {
        iri: Option<NamedNode>,
    },
    SubjectTerm {
        term: Option<Term>,
        statements: Vec<Triple>,
    },
    ObjectTerm {
        term: Option<Term>,
        statements: Vec<Triple>,
    },
    Collection {
        items: Vec<Term>,
        statements: Vec<Triple>,
    },
    PropertyList {
        subject: BlankNode,
        statements: Vec<Triple>,
    },
    LiteralParts {
        value: Option<String>,
        language: Option<String>,
        datatype: Option<NamedNode>,
    },
}

impl Frame {
    /// Routes a lexed term into the slot the current production expects.
    /// Placements the grammar cannot produce are ignored; they only occur
    /// while the parser resynchronizes after an already reported error.
    fn set_term(&mut self, term: Term) {
        match self {
            Self::PrefixDecl { iri, .. } | Self::BaseDecl { iri } | Self::Verb { iri } => {
                if let Term::NamedNode(node) = term {
                    *iri = Some(node);
                }
            }
            Self::SubjectTerm { term: slot, .. } | Self::ObjectTerm { term: slot, .. } => {
                *slot = Some(term);
            }
            Self::Triples { subject, .. } => match term {
                Term::NamedNode(node) => *subject = Some(node.into()),
                Term::BlankNode(node) => *subject = Some(node.into()),
                Term::Literal(_) => {}
            },
            Self::LiteralParts { datatype, .. } => {
                if let Term::NamedNode(node) = term {
                    *datatype = Some(node);
                }
            }
            Self::Document
            | Self::PredicateObjects { .. }
            | Self::Collection { .. }
            | Self::PropertyList { .. } => {}
        }
    }

    fn extend_statements(&mut self, more: Vec<Triple>) {
        match self {
            Self::Triples { statements, .. }
            | Self::PredicateObjects { statements, .. }
            | Self::SubjectTerm { statements, .. }
            | Self::ObjectTerm { statements, .. }
            | Self::Collection { statements, .. }
            | Self::PropertyList { statements, .. } => statements.extend(more),
            Self::Document
            | Self::PrefixDecl { .. }
            | Self::BaseDecl { .. }
            | Self::Verb { .. }
            | Self::LiteralParts { .. } => {}
        }
    }

    /// The subject a nested predicate-object list attaches its statements to.
    fn subject_for_nested(&self) -> Option<Subject> {
        match self {
            Self::Triples { subject, .. } => subject.clone(),
            Self::PropertyList { subject, .. } => Some(subject.clone().into()),
            _ => None,
        }
    }
}

/// The reader state shared by all handlers of one parse run.
pub(crate) struct TurtleContext<'a> {
    base: Option<Iri<String>>,
    prefixes: HashMap<String, String>,
    bnodes: HashMap<String, BlankNode>,
    sink: &'a mut dyn FnMut(Triple),
    trace: Option<&'a mut dyn FnMut(&str, &str)>,
}

impl TurtleContext<'_> {
    fn resolve_iri(&self, text: &str) -> Result<NamedNode, RuleError> {
        if let Some(base) = &self.base {
            let resolved = base
                .resolve(text)
                .map_err(|e| RuleError::from(format!("invalid IRI <{text}>: {e}")))?;
            return Ok(NamedNode::new_unchecked(resolved.into_inner()));
        }
        // Without a base, absolute IRIs are validated and relative references
        // are kept verbatim.
        match Iri::parse(text.to_owned()) {
            Ok(iri) => Ok(NamedNode::new_unchecked(iri.into_inner())),
            Err(_) => Ok(NamedNode::new_unchecked(text.to_owned())),
        }
    }

    fn expand_pname(&self, prefix: &str, local: &str) -> Result<NamedNode, RuleError> {
        let namespace = self
            .prefixes
            .get(prefix)
            .ok_or_else(|| RuleError::from(format!("undefined prefix {prefix:?}")))?;
        NamedNode::new(format!("{namespace}{local}"))
            .map_err(|e| RuleError::from(format!("invalid prefixed name {prefix}:{local}: {e}")))
    }

    fn labeled_bnode(&mut self, label: &str) -> BlankNode {
        self.bnodes
            .entry(label.to_owned())
            .or_insert_with(|| BlankNode::new_unchecked(label))
            .clone()
    }

    fn emit(&mut self, statement: Triple) {
        if let Some(trace) = self.trace.as_mut() {
            trace("statement", &statement.to_string());
        }
        (self.sink)(statement);
    }

    fn trace(&mut self, node: &str, message: &str) {
        if let Some(trace) = self.trace.as_mut() {
            trace(node, message);
        }
    }
}

pub(crate) struct TurtleLang;

impl Language for TurtleLang {
    type Kind = TurtleTerminal;
    type Prod = TurtleProduction;
    type Frame = Frame;
    type Context<'a> = TurtleContext<'a>;
}

type Sym = Symbol<TurtleTerminal, TurtleProduction>;

fn nt(production: TurtleProduction) -> Sym {
    Symbol::Production(production)
}

fn t(terminal: TurtleTerminal) -> Sym {
    Symbol::Terminal(terminal)
}

fn lit(value: &'static str) -> Sym {
    Symbol::Literal(value)
}

// Terminal handlers.

fn on_iriref(
    ctx: &mut TurtleContext<'_>,
    _prod: TurtleProduction,
    token: &Token<TurtleTerminal>,
    frame: &mut Frame,
) -> Result<(), RuleError> {
    let inner = &token.value[1..token.value.len() - 1];
    let node = ctx.resolve_iri(inner)?;
    frame.set_term(node.into());
    Ok(())
}

fn on_pname_ns(
    ctx: &mut TurtleContext<'_>,
    _prod: TurtleProduction,
    token: &Token<TurtleTerminal>,
    frame: &mut Frame,
) -> Result<(), RuleError> {
    let name = &token.value[..token.value.len() - 1];
    if let Frame::PrefixDecl { prefix, .. } = frame {
        *prefix = Some(name.to_owned());
        return Ok(());
    }
    let node = ctx.expand_pname(name, "")?;
    frame.set_term(node.into());
    Ok(())
}

fn on_pname_ln(
    ctx: &mut TurtleContext<'_>,
    _prod: TurtleProduction,
    token: &Token<TurtleTerminal>,
    frame: &mut Frame,
) -> Result<(), RuleError> {
    let (prefix, local) = token
        .value
        .split_once(':')
        .ok_or_else(|| RuleError::from(format!("malformed prefixed name {:?}", token.value)))?;
    let node = ctx.expand_pname(prefix, &unescape_local(local))?;
    frame.set_term(node.into());
    Ok(())
}

/// Strips the backslashes of reserved-character escapes in a PN_LOCAL.
fn unescape_local(local: &str) -> String {
    let mut out = String::with_capacity(local.len());
    let mut chars = local.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn on_blank_node_label(
    ctx: &mut TurtleContext<'_>,
    _prod: TurtleProduction,
    token: &Token<TurtleTerminal>,
    frame: &mut Frame,
) -> Result<(), RuleError> {
    let node = ctx.labeled_bnode(&token.value[2..]);
    frame.set_term(node.into());
    Ok(())
}

fn on_anon(
    _ctx: &mut TurtleContext<'_>,
    _prod: TurtleProduction,
    _token: &Token<TurtleTerminal>,
    frame: &mut Frame,
) -> Result<(), RuleError> {
    frame.set_term(BlankNode::default().into());
    Ok(())
}

fn on_langtag(
    _ctx: &mut TurtleContext<'_>,
    _prod: TurtleProduction,
    token: &Token<TurtleTerminal>,
    frame: &mut Frame,
) -> Result<(), RuleError> {
    let tag = oxilangtag::LanguageTag::parse(token.value[1..].to_owned())
        .map_err(|e| RuleError::from(format!("invalid language tag {:?}: {e}", token.value)))?;
    if let Frame::LiteralParts { language, .. } = frame {
        *language = Some(tag.into_inner());
    }
    Ok(())
}

fn on_integer(
    _ctx: &mut TurtleContext<'_>,
    _prod: TurtleProduction,
    token: &Token<TurtleTerminal>,
    frame: &mut Frame,
) -> Result<(), RuleError> {
    frame.set_term(Literal::new_typed_literal(token.value.clone(), xsd::INTEGER).into());
    Ok(())
}

fn on_decimal(
    _ctx: &mut TurtleContext<'_>,
    _prod: TurtleProduction,
    token: &Token<TurtleTerminal>,
    frame: &mut Frame,
) -> Result<(), RuleError> {
    frame.set_term(Literal::new_typed_literal(token.value.clone(), xsd::DECIMAL).into());
    Ok(())
}

fn on_double(
    _ctx: &mut TurtleContext<'_>,
    _prod: TurtleProduction,
    token: &Token<TurtleTerminal>,
    frame: &mut Frame,
) -> Result<(), RuleError> {
    frame.set_term(Literal::new_typed_literal(token.value.clone(), xsd::DOUBLE).into());
    Ok(())
}

fn on_string(
    _ctx: &mut TurtleContext<'_>,
    _prod: TurtleProduction,
    token: &Token<TurtleTerminal>,
    frame: &mut Frame,
) -> Result<(), RuleError> {
    // Judge the delimiter length from the kind, not the text: unescaping may
    // have produced quote characters right after the opening delimiter.
    let quote_len = match token.kind {
        Some(
            TurtleTerminal::StringLiteralLongQuote | TurtleTerminal::StringLiteralLongSingleQuote,
        ) => 3,
        _ => 1,
    };
    let inner = &token.value[quote_len..token.value.len() - quote_len];
    if let Frame::LiteralParts { value, .. } = frame {
        *value = Some(inner.to_owned());
    }
    Ok(())
}

/// Catch-all for the anonymous punctuation/keyword terminal.
fn on_punctuation(
    _ctx: &mut TurtleContext<'_>,
    _prod: TurtleProduction,
    token: &Token<TurtleTerminal>,
    frame: &mut Frame,
) -> Result<(), RuleError> {
    match token.value.as_str() {
        "a" => frame.set_term(NamedNode::from(rdf::TYPE).into()),
        "true" | "false" => {
            frame.set_term(Literal::new_typed_literal(token.value.clone(), xsd::BOOLEAN).into());
        }
        _ => {}
    }
    Ok(())
}

// Production handlers.

fn prefix_decl(
    ctx: &mut TurtleContext<'_>,
    step: HandlerStep,
    _parent: &mut Frame,
    current: &mut Frame,
) -> Result<(), RuleError> {
    match step {
        HandlerStep::Start => {
            *current = Frame::PrefixDecl {
                prefix: None,
                iri: None,
            };
        }
        HandlerStep::Finish => {
            if let Frame::PrefixDecl {
                prefix: Some(prefix),
                iri: Some(iri),
            } = std::mem::take(current)
            {
                ctx.trace("prefix", &format!("{prefix}: <{iri}>"));
                ctx.prefixes.insert(prefix, iri.into_string());
            }
        }
    }
    Ok(())
}

fn base_decl(
    ctx: &mut TurtleContext<'_>,
    step: HandlerStep,
    _parent: &mut Frame,
    current: &mut Frame,
) -> Result<(), RuleError> {
    match step {
        HandlerStep::Start => *current = Frame::BaseDecl { iri: None },
        HandlerStep::Finish => {
            if let Frame::BaseDecl { iri: Some(iri) } = std::mem::take(current) {
                ctx.trace("base", iri.as_str());
                let iri = Iri::parse(iri.into_string())
                    .map_err(|e| RuleError::from(format!("invalid base IRI: {e}")))?;
                ctx.base = Some(iri);
            }
        }
    }
    Ok(())
}

fn triples(
    ctx: &mut TurtleContext<'_>,
    step: HandlerStep,
    _parent: &mut Frame,
    current: &mut Frame,
) -> Result<(), RuleError> {
    match step {
        HandlerStep::Start => {
            *current = Frame::Triples {
                subject: None,
                statements: Vec::new(),
            };
        }
        HandlerStep::Finish => {
            if let Frame::Triples { statements, .. } = std::mem::take(current) {
                for statement in statements {
                    ctx.emit(statement);
                }
            }
        }
    }
    Ok(())
}

fn subject(
    _ctx: &mut TurtleContext<'_>,
    step: HandlerStep,
    parent: &mut Frame,
    current: &mut Frame,
) -> Result<(), RuleError> {
    match step {
        HandlerStep::Start => {
            *current = Frame::SubjectTerm {
                term: None,
                statements: Vec::new(),
            };
        }
        HandlerStep::Finish => {
            if let Frame::SubjectTerm { term, statements } = std::mem::take(current) {
                parent.extend_statements(statements);
                if let Some(term) = term {
                    parent.set_term(term);
                }
            }
        }
    }
    Ok(())
}

fn verb(
    _ctx: &mut TurtleContext<'_>,
    step: HandlerStep,
    parent: &mut Frame,
    current: &mut Frame,
) -> Result<(), RuleError> {
    match step {
        HandlerStep::Start => *current = Frame::Verb { iri: None },
        HandlerStep::Finish => {
            if let Frame::Verb { iri: Some(iri) } = std::mem::take(current) {
                if let Frame::PredicateObjects { predicate, .. } = parent {
                    *predicate = Some(iri);
                }
            }
        }
    }
    Ok(())
}

fn predicate_objects(
    _ctx: &mut TurtleContext<'_>,
    step: HandlerStep,
    parent: &mut Frame,
    current: &mut Frame,
) -> Result<(), RuleError> {
    match step {
        HandlerStep::Start => {
            *current = Frame::PredicateObjects {
                subject: parent.subject_for_nested(),
                predicate: None,
                statements: Vec::new(),
            };
        }
        HandlerStep::Finish => {
            if let Frame::PredicateObjects { statements, .. } = std::mem::take(current) {
                parent.extend_statements(statements);
            }
        }
    }
    Ok(())
}

fn object(
    _ctx: &mut TurtleContext<'_>,
    step: HandlerStep,
    parent: &mut Frame,
    current: &mut Frame,
) -> Result<(), RuleError> {
    match step {
        HandlerStep::Start => {
            *current = Frame::ObjectTerm {
                term: None,
                statements: Vec::new(),
            };
        }
        HandlerStep::Finish => {
            if let Frame::ObjectTerm { term, statements } = std::mem::take(current) {
                match parent {
                    Frame::Collection {
                        items,
                        statements: parent_statements,
                    } => {
                        parent_statements.extend(statements);
                        if let Some(term) = term {
                            items.push(term);
                        }
                    }
                    Frame::PredicateObjects {
                        subject,
                        predicate,
                        statements: parent_statements,
                    } => {
                        parent_statements.extend(statements);
                        if let (Some(subject), Some(predicate), Some(term)) =
                            (subject.as_ref(), predicate.as_ref(), term)
                        {
                            parent_statements.push(Triple::new(
                                subject.clone(),
                                predicate.clone(),
                                term,
                            ));
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

fn collection(
    _ctx: &mut TurtleContext<'_>,
    step: HandlerStep,
    parent: &mut Frame,
    current: &mut Frame,
) -> Result<(), RuleError> {
    match step {
        HandlerStep::Start => {
            *current = Frame::Collection {
                items: Vec::new(),
                statements: Vec::new(),
            };
        }
        HandlerStep::Finish => {
            if let Frame::Collection {
                items,
                mut statements,
            } = std::mem::take(current)
            {
                let mut head: Term = NamedNode::from(rdf::NIL).into();
                for item in items.into_iter().rev() {
                    let node = BlankNode::default();
                    statements.push(Triple::new(node.clone(), rdf::FIRST, item));
                    statements.push(Triple::new(node.clone(), rdf::REST, head));
                    head = node.into();
                }
                parent.extend_statements(statements);
                parent.set_term(head);
            }
        }
    }
    Ok(())
}

fn property_list(
    _ctx: &mut TurtleContext<'_>,
    step: HandlerStep,
    parent: &mut Frame,
    current: &mut Frame,
) -> Result<(), RuleError> {
    match step {
        HandlerStep::Start => {
            *current = Frame::PropertyList {
                subject: BlankNode::default(),
                statements: Vec::new(),
            };
        }
        HandlerStep::Finish => {
            if let Frame::PropertyList {
                subject,
                statements,
            } = std::mem::take(current)
            {
                parent.extend_statements(statements);
                parent.set_term(subject.into());
            }
        }
    }
    Ok(())
}

fn rdf_literal(
    _ctx: &mut TurtleContext<'_>,
    step: HandlerStep,
    parent: &mut Frame,
    current: &mut Frame,
) -> Result<(), RuleError> {
    match step {
        HandlerStep::Start => {
            *current = Frame::LiteralParts {
                value: None,
                language: None,
                datatype: None,
            };
        }
        HandlerStep::Finish => {
            if let Frame::LiteralParts {
                value: Some(value),
                language,
                datatype,
            } = std::mem::take(current)
            {
                let literal = if let Some(datatype) = datatype {
                    Literal::new_typed_literal(value, datatype)
                } else if let Some(language) = language {
                    Literal::new_language_tagged_literal(value, language)
                        .map_err(|e| RuleError::from(format!("invalid language tag: {e}")))?
                } else {
                    Literal::new_simple_literal(value)
                };
                parent.set_term(literal.into());
            }
        }
    }
    Ok(())
}

fn build_grammar() -> Result<Grammar<TurtleLang>, ConfigError> {
    use TurtleProduction as P;
    use TurtleTerminal as T;

    GrammarBuilder::<TurtleLang>::new()
        .terminal(Some(T::Anon), terminals::ANON, false)
        .terminal(Some(T::BlankNodeLabel), &terminals::blank_node_label(), false)
        .terminal(Some(T::Iriref), terminals::IRIREF, true)
        .terminal(Some(T::Double), terminals::DOUBLE, false)
        .terminal(Some(T::Decimal), terminals::DECIMAL, false)
        .terminal(Some(T::Integer), terminals::INTEGER, false)
        .terminal(Some(T::PnameLn), &terminals::pname_ln(), false)
        .terminal(Some(T::PnameNs), &terminals::pname_ns(), false)
        .terminal(
            Some(T::StringLiteralLongSingleQuote),
            &terminals::string_literal_long_single_quote(),
            true,
        )
        .terminal(
            Some(T::StringLiteralLongQuote),
            &terminals::string_literal_long_quote(),
            true,
        )
        .terminal(
            Some(T::StringLiteralQuote),
            &terminals::string_literal_quote(),
            true,
        )
        .terminal(
            Some(T::StringLiteralSingleQuote),
            &terminals::string_literal_single_quote(),
            true,
        )
        .terminal(None, terminals::PUNCTUATION, false)
        .terminal(Some(T::Langtag), terminals::LANGTAG, false)
        .terminal(Some(T::Prefix), terminals::SPARQL_PREFIX, false)
        .terminal(Some(T::Base), terminals::SPARQL_BASE, false)
        .on_terminal(Some(T::Iriref), on_iriref)
        .on_terminal(Some(T::PnameLn), on_pname_ln)
        .on_terminal(Some(T::PnameNs), on_pname_ns)
        .on_terminal(Some(T::BlankNodeLabel), on_blank_node_label)
        .on_terminal(Some(T::Anon), on_anon)
        .on_terminal(Some(T::Langtag), on_langtag)
        .on_terminal(Some(T::Integer), on_integer)
        .on_terminal(Some(T::Decimal), on_decimal)
        .on_terminal(Some(T::Double), on_double)
        .on_terminal(Some(T::StringLiteralQuote), on_string)
        .on_terminal(Some(T::StringLiteralSingleQuote), on_string)
        .on_terminal(Some(T::StringLiteralLongQuote), on_string)
        .on_terminal(Some(T::StringLiteralLongSingleQuote), on_string)
        .on_terminal(None, on_punctuation)
        .on_production(P::PrefixId, prefix_decl)
        .on_production(P::SparqlPrefix, prefix_decl)
        .on_production(P::Base, base_decl)
        .on_production(P::SparqlBase, base_decl)
        .on_production(P::Triples, triples)
        .on_production(P::Subject, subject)
        .on_production(P::Verb, verb)
        .on_production(P::PredicateObjectList, predicate_objects)
        .on_production(P::Object, object)
        .on_production(P::Collection, collection)
        .on_production(P::BlankNodePropertyList, property_list)
        .on_production(P::RdfLiteral, rdf_literal)
        .rule(
            P::TurtleDoc,
            &[&[nt(P::Statement), nt(P::TurtleDoc)], &[]],
        )
        .rule(
            P::Statement,
            &[&[nt(P::Directive)], &[nt(P::Triples), lit(".")]],
        )
        .rule(
            P::Directive,
            &[
                &[nt(P::PrefixId)],
                &[nt(P::Base)],
                &[nt(P::SparqlPrefix)],
                &[nt(P::SparqlBase)],
            ],
        )
        .rule(
            P::PrefixId,
            &[&[lit("@prefix"), t(T::PnameNs), t(T::Iriref), lit(".")]],
        )
        .rule(P::Base, &[&[lit("@base"), t(T::Iriref), lit(".")]])
        .rule(
            P::SparqlPrefix,
            &[&[t(T::Prefix), t(T::PnameNs), t(T::Iriref)]],
        )
        .rule(P::SparqlBase, &[&[t(T::Base), t(T::Iriref)]])
        .rule(
            P::Triples,
            &[
                &[nt(P::Subject), nt(P::PredicateObjectList)],
                &[nt(P::BlankNodePropertyList), nt(P::PredicateObjectListOpt)],
            ],
        )
        .rule(
            P::PredicateObjectListOpt,
            &[&[nt(P::PredicateObjectList)], &[]],
        )
        .rule(
            P::PredicateObjectList,
            &[&[nt(P::Verb), nt(P::ObjectList), nt(P::PredicateObjectTail)]],
        )
        .rule(
            P::PredicateObjectTail,
            &[
                &[lit(";"), nt(P::PredicateObjectSemi), nt(P::PredicateObjectTail)],
                &[],
            ],
        )
        .rule(
            P::PredicateObjectSemi,
            &[&[nt(P::Verb), nt(P::ObjectList)], &[]],
        )
        .rule(P::ObjectList, &[&[nt(P::Object), nt(P::ObjectListTail)]])
        .rule(
            P::ObjectListTail,
            &[&[lit(","), nt(P::Object), nt(P::ObjectListTail)], &[]],
        )
        .rule(P::Verb, &[&[nt(P::Predicate)], &[lit("a")]])
        .rule(P::Predicate, &[&[nt(P::Iri)]])
        .rule(
            P::Subject,
            &[&[nt(P::Iri)], &[nt(P::BlankNodeTerm)], &[nt(P::Collection)]],
        )
        .rule(
            P::Object,
            &[
                &[nt(P::Iri)],
                &[nt(P::BlankNodeTerm)],
                &[nt(P::Collection)],
                &[nt(P::BlankNodePropertyList)],
                &[nt(P::Literal)],
            ],
        )
        .rule(
            P::Literal,
            &[
                &[nt(P::RdfLiteral)],
                &[nt(P::NumericLiteral)],
                &[nt(P::BooleanLiteral)],
            ],
        )
        .rule(
            P::BlankNodePropertyList,
            &[&[lit("["), nt(P::PredicateObjectList), lit("]")]],
        )
        .rule(
            P::Collection,
            &[&[lit("("), nt(P::CollectionItems), lit(")")]],
        )
        .rule(
            P::CollectionItems,
            &[&[nt(P::Object), nt(P::CollectionItems)], &[]],
        )
        .rule(
            P::NumericLiteral,
            &[&[t(T::Integer)], &[t(T::Decimal)], &[t(T::Double)]],
        )
        .rule(
            P::RdfLiteral,
            &[&[nt(P::StringLit), nt(P::RdfLiteralSuffix)]],
        )
        .rule(
            P::RdfLiteralSuffix,
            &[&[t(T::Langtag)], &[lit("^^"), nt(P::Iri)], &[]],
        )
        .rule(P::BooleanLiteral, &[&[lit("true")], &[lit("false")]])
        .rule(
            P::StringLit,
            &[
                &[t(T::StringLiteralQuote)],
                &[t(T::StringLiteralSingleQuote)],
                &[t(T::StringLiteralLongQuote)],
                &[t(T::StringLiteralLongSingleQuote)],
            ],
        )
        .rule(P::Iri, &[&[t(T::Iriref)], &[nt(P::PrefixedName)]])
        .rule(
            P::PrefixedName,
            &[&[t(T::PnameLn)], &[t(T::PnameNs)]],
        )
        .rule(
            P::BlankNodeTerm,
            &[&[t(T::BlankNodeLabel)], &[t(T::Anon)]],
        )
        .start(P::TurtleDoc)
        .build()
}

static GRAMMAR: LazyLock<Result<Grammar<TurtleLang>, ConfigError>> = LazyLock::new(build_grammar);

fn grammar() -> Result<&'static Grammar<TurtleLang>, TurtleParseError> {
    GRAMMAR
        .as_ref()
        .map_err(|e| TurtleParseError::Config(e.clone()))
}

/// What the reader knows once a parse finished: the final prefix map and base
/// IRI, as updated by the directives in the document.
#[derive(Debug, Clone, Default)]
pub struct TurtleMetadata {
    prefixes: HashMap<String, String>,
    base_iri: Option<String>,
}

impl TurtleMetadata {
    /// The declared prefixes as (name, IRI) pairs.
    pub fn prefixes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes
            .iter()
            .map(|(name, iri)| (name.as_str(), iri.as_str()))
    }

    pub fn base_iri(&self) -> Option<&str> {
        self.base_iri.as_deref()
    }
}

/// A [Turtle](https://www.w3.org/TR/turtle/) parser.
///
/// Parsed triples are pushed into a caller-supplied sink as soon as the
/// enclosing statement completes:
///
/// ```
/// use terrapin::TurtleParser;
///
/// let file = r#"@prefix schema: <http://schema.org/> .
/// <http://example.com/foo> a schema:Person ;
///     schema:name "Foo" ."#;
///
/// let mut count = 0;
/// TurtleParser::new().parse_str(file, &mut |_| count += 1)?;
/// assert_eq!(count, 2);
/// # Result::<_, terrapin::TurtleParseError>::Ok(())
/// ```
#[derive(Default, Clone)]
#[must_use]
pub struct TurtleParser {
    base: Option<Iri<String>>,
    prefixes: HashMap<String, String>,
    validate: bool,
}

impl TurtleParser {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative IRIs in the document against `base_iri`.
    #[inline]
    pub fn with_base_iri(mut self, base_iri: impl Into<String>) -> Result<Self, IriParseError> {
        self.base = Some(Iri::parse(base_iri.into())?);
        Ok(self)
    }

    /// Pre-declares a prefix, as if the document opened with an `@prefix`.
    #[inline]
    pub fn with_prefix(
        mut self,
        prefix_name: impl Into<String>,
        prefix_iri: impl Into<String>,
    ) -> Result<Self, IriParseError> {
        self.prefixes
            .insert(prefix_name.into(), Iri::parse(prefix_iri.into())?.into_inner());
        Ok(self)
    }

    /// Aborts at the first violation instead of recovering and accumulating.
    #[inline]
    pub fn validate(mut self) -> Self {
        self.validate = true;
        self
    }

    /// Parses a Turtle document, pushing each triple into `on_triple`.
    ///
    /// With validation off the parser resynchronizes after errors and keeps
    /// emitting the triples it can still make sense of; the violations are
    /// raised as one aggregated [`ParseError`] at the end.
    pub fn parse_str(
        &self,
        input: &str,
        on_triple: &mut dyn FnMut(Triple),
    ) -> Result<TurtleMetadata, TurtleParseError> {
        self.parse_with(input, on_triple, None)
    }

    /// Like [`parse_str`](Self::parse_str), additionally reporting reader
    /// events (`prefix`, `base`, `statement`) to `trace`.
    pub fn parse_str_with_trace(
        &self,
        input: &str,
        on_triple: &mut dyn FnMut(Triple),
        trace: &mut dyn FnMut(&str, &str),
    ) -> Result<TurtleMetadata, TurtleParseError> {
        self.parse_with(input, on_triple, Some(trace))
    }

    /// Parses a Turtle document from a [`Read`] implementation. The reader is
    /// drained through [`Read::read_to_string`], which also enforces UTF-8.
    pub fn parse_reader(
        &self,
        mut reader: impl Read,
        on_triple: &mut dyn FnMut(Triple),
    ) -> Result<TurtleMetadata, TurtleParseError> {
        let mut input = String::new();
        reader.read_to_string(&mut input)?;
        self.parse_str(&input, on_triple)
    }

    /// Parses a whole document into an [`oxrdf::Graph`].
    pub fn parse_to_graph(&self, input: &str) -> Result<Graph, TurtleParseError> {
        let mut graph = Graph::new();
        self.parse_str(input, &mut |t| {
            graph.insert(&t);
        })?;
        Ok(graph)
    }

    fn parse_with<'a>(
        &self,
        input: &str,
        sink: &'a mut dyn FnMut(Triple),
        trace: Option<&'a mut dyn FnMut(&str, &str)>,
    ) -> Result<TurtleMetadata, TurtleParseError> {
        let grammar = grammar()?;
        let mut ctx = TurtleContext {
            base: self.base.clone(),
            prefixes: self.prefixes.clone(),
            bnodes: HashMap::new(),
            sink,
            trace,
        };
        let parser = Parser::new(grammar, input)?;
        let outcome = parser.parse(
            &mut ctx,
            &ParseOptions {
                validate: self.validate,
            },
        );
        let metadata = TurtleMetadata {
            prefixes: ctx.prefixes,
            base_iri: ctx.base.map(Iri::into_inner),
        };
        outcome?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::NamedNodeRef;

    fn parse(input: &str) -> Vec<Triple> {
        let mut triples = Vec::new();
        TurtleParser::new()
            .parse_str(input, &mut |t| triples.push(t))
            .unwrap();
        triples
    }

    fn named(iri: &str) -> NamedNode {
        NamedNode::new_unchecked(iri)
    }

    #[test]
    fn prefix_declaration_and_triple() {
        let triples = parse("@prefix ex: <http://e/> . ex:a ex:b ex:c .");
        assert_eq!(
            triples,
            [Triple::new(named("http://e/a"), named("http://e/b"), named("http://e/c"))]
        );
    }

    #[test]
    fn sparql_style_directives() {
        let triples = parse("PREFIX ex: <http://e/>\nBase <http://b/>\nex:a ex:b <rel> .");
        assert_eq!(
            triples,
            [Triple::new(named("http://e/a"), named("http://e/b"), named("http://b/rel"))]
        );
    }

    #[test]
    fn base_resolution_applies_to_later_iris() {
        let triples = parse("@base <http://example.com/dir/> . <a> <b> <../c> .");
        assert_eq!(
            triples,
            [Triple::new(
                named("http://example.com/dir/a"),
                named("http://example.com/dir/b"),
                named("http://example.com/c"),
            )]
        );
    }

    #[test]
    fn predicate_object_and_object_lists() {
        let triples = parse("@prefix : <http://e/> . :s :p :o1 , :o2 ; :q :o3 ; .");
        assert_eq!(triples.len(), 3);
        assert_eq!(triples[0].predicate, named("http://e/p"));
        assert_eq!(triples[2].predicate, named("http://e/q"));
    }

    #[test]
    fn keyword_a_is_rdf_type() {
        let triples = parse("@prefix : <http://e/> . :s a :C .");
        assert_eq!(triples[0].predicate, rdf::TYPE.into_owned());
    }

    #[test]
    fn numeric_and_boolean_literals() {
        let triples = parse("@prefix : <http://e/> . :s :p 4 , 4.5 , 4.5e0 , true .");
        let datatypes: Vec<NamedNodeRef<'_>> = triples
            .iter()
            .map(|t| match &t.object {
                Term::Literal(l) => l.datatype(),
                _ => panic!("expected literal"),
            })
            .collect();
        assert!(datatypes.contains(&xsd::INTEGER));
        assert!(datatypes.contains(&xsd::DECIMAL));
        assert!(datatypes.contains(&xsd::DOUBLE));
        assert!(datatypes.contains(&xsd::BOOLEAN));
    }

    #[test]
    fn string_literal_forms() {
        let triples = parse(
            "@prefix : <http://e/> . :s :p \"plain\" , 'single' , \"tagged\"@en-GB , \"typed\"^^:dt .",
        );
        let objects: Vec<String> = triples.iter().map(|t| t.object.to_string()).collect();
        assert!(objects.contains(&"\"plain\"".to_owned()));
        assert!(objects.contains(&"\"single\"".to_owned()));
        assert!(objects.contains(&"\"tagged\"@en-gb".to_owned()));
        assert!(objects.contains(&"\"typed\"^^<http://e/dt>".to_owned()));
    }

    #[test]
    fn multi_line_literal_keeps_real_newline() {
        let triples = parse("<http://e/a> <http://e/b> \"\"\"line1\nline2\"\"\" .");
        let Term::Literal(literal) = &triples[0].object else {
            panic!("expected literal");
        };
        assert_eq!(literal.value(), "line1\nline2");
    }

    #[test]
    fn escape_normalization_in_literals() {
        let triples = parse(r#"<http://e/a> <http://e/b> "A\n\\B" ."#);
        let Term::Literal(literal) = &triples[0].object else {
            panic!("expected literal");
        };
        assert_eq!(literal.value(), "A\n\\B");
    }

    #[test]
    fn iriref_escapes_are_decoded() {
        let triples = parse(r"<http://e/a> <http://e/b> <http://e/\u0041> .");
        assert_eq!(triples[0].object, Term::from(named("http://e/A")));
    }

    #[test]
    fn pn_local_escapes_are_decoded() {
        let triples = parse(r"@prefix ex: <http://e/> . ex:a ex:b ex:with\,comma .");
        assert_eq!(triples[0].object, named("http://e/with,comma").into());
    }

    #[test]
    fn collections_desugar_to_first_rest_chains() {
        let triples = parse("@prefix : <http://e/> . :s :p ( 1 2 3 ) .");
        assert_eq!(triples.len(), 7);
        let firsts: Vec<_> = triples
            .iter()
            .filter(|t| t.predicate == rdf::FIRST.into_owned())
            .collect();
        let rests: Vec<_> = triples
            .iter()
            .filter(|t| t.predicate == rdf::REST.into_owned())
            .collect();
        assert_eq!(firsts.len(), 3);
        assert_eq!(rests.len(), 3);
        assert_eq!(
            rests
                .iter()
                .filter(|t| t.object == Term::from(NamedNode::from(rdf::NIL)))
                .count(),
            1
        );
        // The user triple points at the head of the chain.
        let user = triples
            .iter()
            .find(|t| t.predicate == named("http://e/p"))
            .unwrap();
        assert!(matches!(user.object, Term::BlankNode(_)));
    }

    #[test]
    fn empty_collection_is_rdf_nil() {
        let triples = parse("@prefix : <http://e/> . :s :p () .");
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].object, Term::from(NamedNode::from(rdf::NIL)));
    }

    #[test]
    fn collection_as_subject() {
        let triples = parse("@prefix : <http://e/> . ( 1 ) :p :o .");
        assert_eq!(triples.len(), 3);
        assert!(
            triples
                .iter()
                .any(|t| t.predicate == named("http://e/p") && matches!(t.subject, Subject::BlankNode(_)))
        );
    }

    #[test]
    fn blank_node_property_lists_nest() {
        let triples = parse("_:b <http://e/p> [ <http://e/q> \"x\" ] .");
        assert_eq!(triples.len(), 2);
        let inner = triples
            .iter()
            .find(|t| t.predicate == named("http://e/q"))
            .unwrap();
        let outer = triples
            .iter()
            .find(|t| t.predicate == named("http://e/p"))
            .unwrap();
        assert_eq!(outer.subject, Subject::BlankNode(BlankNode::new_unchecked("b")));
        let Term::BlankNode(inner_subject) = &outer.object else {
            panic!("expected blank node object");
        };
        assert_eq!(inner.subject, Subject::BlankNode(inner_subject.clone()));
    }

    #[test]
    fn blank_node_property_list_as_subject() {
        let triples = parse("@prefix : <http://e/> . [ :p 1 ] :q 2 .");
        assert_eq!(triples.len(), 2);
        let (first, second) = (&triples[0], &triples[1]);
        assert_eq!(first.subject, second.subject);
    }

    #[test]
    fn blank_node_labels_are_stable_and_anon_is_fresh() {
        let triples = parse("_:x <http://e/p> _:x , [] , [] .");
        assert_eq!(triples.len(), 3);
        assert_eq!(triples[0].object, Term::BlankNode(BlankNode::new_unchecked("x")));
        let Term::BlankNode(first_anon) = &triples[1].object else {
            panic!("expected blank node");
        };
        let Term::BlankNode(second_anon) = &triples[2].object else {
            panic!("expected blank node");
        };
        assert_ne!(first_anon, second_anon);
    }

    #[test]
    fn undefined_prefix_is_reported_with_line() {
        let outcome = TurtleParser::new().parse_str("\nex:a <http://e/b> 1 .", &mut |_| {});
        let Err(TurtleParseError::Syntax(error)) = outcome else {
            panic!("expected syntax error");
        };
        assert_eq!(error.violations()[0].lineno, 2);
        assert!(error.violations()[0].message.contains("undefined prefix"));
    }

    #[test]
    fn recovery_emits_later_triples_and_aggregates() {
        let input = "@prefix ex: <http://e/> . ex:a ex:b % . ex:c ex:d ex:e .";
        let mut triples = Vec::new();
        let outcome = TurtleParser::new().parse_str(input, &mut |t| triples.push(t));
        let Err(TurtleParseError::Syntax(error)) = outcome else {
            panic!("expected syntax error");
        };
        assert!(!error.violations().is_empty());
        assert_eq!(
            triples,
            [Triple::new(named("http://e/c"), named("http://e/d"), named("http://e/e"))]
        );
    }

    #[test]
    fn validate_stops_at_the_first_violation() {
        let input = "@prefix ex: <http://e/> . ex:a ex:b % . ex:c ex:d ex:e .";
        let mut triples = Vec::new();
        let outcome = TurtleParser::new()
            .validate()
            .parse_str(input, &mut |t| triples.push(t));
        let Err(TurtleParseError::Syntax(error)) = outcome else {
            panic!("expected syntax error");
        };
        assert_eq!(error.violations().len(), 1);
        assert!(triples.is_empty());
    }

    #[test]
    fn unterminated_statement_reports_eof() {
        let outcome = TurtleParser::new().parse_str("<http://e/a> <http://e/b>", &mut |_| {});
        let Err(TurtleParseError::Syntax(error)) = outcome else {
            panic!("expected syntax error");
        };
        assert!(
            error
                .violations()
                .iter()
                .any(|v| v.message.contains("end of file"))
        );
    }

    #[test]
    fn comments_and_blank_documents() {
        assert!(parse("# nothing here\n").is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn metadata_reports_prefixes_and_base() {
        let metadata = TurtleParser::new()
            .parse_str("@base <http://b/> . @prefix ex: <http://e/> .", &mut |_| {})
            .unwrap();
        assert_eq!(metadata.base_iri(), Some("http://b/"));
        assert_eq!(
            metadata.prefixes().collect::<Vec<_>>(),
            [("ex", "http://e/")]
        );
    }

    #[test]
    fn trace_reports_reader_events() {
        let mut events = Vec::new();
        TurtleParser::new()
            .parse_str_with_trace(
                "@prefix ex: <http://e/> . ex:a ex:b ex:c .",
                &mut |_| {},
                &mut |node, message| events.push(format!("{node}: {message}")),
            )
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].starts_with("prefix"));
        assert!(events[1].starts_with("statement"));
    }

    #[test]
    fn parse_reader_collects_the_same_triples() {
        let input = "@prefix ex: <http://e/> . ex:a ex:b ex:c .";
        let mut triples = Vec::new();
        TurtleParser::new()
            .parse_reader(input.as_bytes(), &mut |t| triples.push(t))
            .unwrap();
        assert_eq!(triples.len(), 1);
    }

    #[test]
    fn parse_to_graph_deduplicates() {
        let graph = TurtleParser::new()
            .parse_to_graph("@prefix : <http://e/> . :s :p :o . :s :p :o .")
            .unwrap();
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn preset_prefixes_and_base() {
        let triples = TurtleParser::new()
            .with_base_iri("http://b/")
            .unwrap()
            .with_prefix("ex", "http://e/")
            .unwrap()
            .parse_to_graph("ex:a ex:b <rel> .")
            .unwrap();
        assert!(triples.contains(&Triple::new(
            named("http://e/a"),
            named("http://e/b"),
            named("http://b/rel"),
        )));
    }
}
