//! A compact [Turtle](https://www.w3.org/TR/turtle/) serializer implemented
//! by [`TurtleSerializer`].
//!
//! Triples are buffered into an [`oxrdf::Graph`]; `finish` then walks the
//! graph, counts references, discovers usable prefixes, and prints each
//! subject once, inlining blank nodes as `[ … ]` and well-formed
//! `rdf:first`/`rdf:rest` chains as `( … )`.

use crate::terminals;
use oxiri::{Iri, IriParseError};
use oxrdf::vocab::{rdf, rdfs, xsd};
use oxrdf::{BlankNode, Graph, Literal, NamedNode, NamedNodeRef, Subject, Term, TripleRef};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::{self, Write};
use std::sync::LazyLock;

/// A serialization error: I/O on the output stream, or a node the writer
/// cannot express.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("cannot serialize invalid IRI <{iri}>: {message}")]
    InvalidIri { iri: String, message: String },
}

const DC_TITLE: NamedNodeRef<'_> = NamedNodeRef::new_unchecked("http://purl.org/dc/terms/title");

/// Namespaces probed for synthetic prefixes when `with_standard_prefixes` is
/// enabled.
const STANDARD_VOCABULARIES: &[&str] = &[
    "http://www.w3.org/1999/02/22-rdf-syntax-ns#",
    "http://www.w3.org/2000/01/rdf-schema#",
    "http://www.w3.org/2001/XMLSchema#",
    "http://www.w3.org/2002/07/owl#",
    "http://www.w3.org/2004/02/skos/core#",
    "http://purl.org/dc/terms/",
    "http://purl.org/dc/elements/1.1/",
    "http://xmlns.com/foaf/0.1/",
    "https://schema.org/",
];

static QNAME_LOCAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!(r"\A(?:{})?\z", terminals::pn_local())).ok());
static PREFIX_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!(r"\A{}\z", terminals::pn_prefix())).ok());
static BARE_INTEGER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!(r"\A{}\z", terminals::INTEGER)).ok());
static BARE_DECIMAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!(r"\A{}\z", terminals::DECIMAL)).ok());
static BARE_DOUBLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!(r"\A{}\z", terminals::DOUBLE)).ok());

fn matches_full(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

/// A [Turtle](https://www.w3.org/TR/turtle/) serializer.
///
/// ```
/// use oxrdf::{Graph, NamedNodeRef, TripleRef};
/// use terrapin::TurtleSerializer;
///
/// let mut graph = Graph::new();
/// graph.insert(TripleRef::new(
///     NamedNodeRef::new("http://example.com/s")?,
///     NamedNodeRef::new("http://example.com/ns#p")?,
///     NamedNodeRef::new("http://example.com/o")?,
/// ));
/// let mut serializer = TurtleSerializer::new()
///     .with_prefix("ns", "http://example.com/ns#")?
///     .for_writer(Vec::new());
/// serializer.serialize_graph(&graph);
/// let out = String::from_utf8_lossy(&serializer.finish()?).into_owned();
/// assert!(out.contains("ns:p"));
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone)]
#[must_use]
pub struct TurtleSerializer {
    base: Option<Iri<String>>,
    prefixes: BTreeMap<String, String>,
    standard_prefixes: bool,
    max_depth: usize,
    canonicalize: bool,
}

impl Default for TurtleSerializer {
    fn default() -> Self {
        Self {
            base: None,
            prefixes: BTreeMap::new(),
            standard_prefixes: false,
            max_depth: 3,
            canonicalize: false,
        }
    }
}

impl TurtleSerializer {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits `@base` and prints IRIs under it as relative references.
    #[inline]
    pub fn with_base_iri(mut self, base_iri: impl Into<String>) -> Result<Self, IriParseError> {
        self.base = Some(Iri::parse(base_iri.into())?);
        Ok(self)
    }

    /// Adds a prefix candidate; only prefixes actually used in the body are
    /// emitted.
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

    /// The namespace printed with the empty prefix (`:local`).
    #[inline]
    pub fn with_default_namespace(self, iri: impl Into<String>) -> Result<Self, IriParseError> {
        self.with_prefix(String::new(), iri)
    }

    /// Discovers prefixes for well-known vocabularies, naming them after the
    /// last path segment of the namespace, lowercased.
    #[inline]
    pub fn with_standard_prefixes(mut self) -> Self {
        self.standard_prefixes = true;
        self
    }

    /// Recursion cutoff when inlining blank nodes; whatever the bound cuts
    /// off is emitted as a standalone subject instead.
    #[inline]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Rewrites `xsd` boolean/numeric literals into their canonical lexical
    /// forms before printing.
    #[inline]
    pub fn canonicalize(mut self) -> Self {
        self.canonicalize = true;
        self
    }

    /// Builds a serializer buffering into `writer`; nothing is written until
    /// [`finish`](WriterTurtleSerializer::finish).
    pub fn for_writer<W: Write>(self, writer: W) -> WriterTurtleSerializer<W> {
        WriterTurtleSerializer {
            options: self,
            writer,
            graph: Graph::new(),
        }
    }

    /// Serializes a whole graph to a string.
    pub fn serialize_graph_to_string(self, graph: &Graph) -> Result<String, WriterError> {
        let mut serializer = self.for_writer(Vec::new());
        serializer.serialize_graph(graph);
        let bytes = serializer.finish()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Writes a Turtle file to a [`Write`] implementation.
///
/// Can be built using [`TurtleSerializer::for_writer`]. Triples are buffered;
/// [`finish`](Self::finish) runs the serialization and commits everything to
/// the writer.
#[must_use]
pub struct WriterTurtleSerializer<W: Write> {
    options: TurtleSerializer,
    writer: W,
    graph: Graph,
}

impl<W: Write> WriterTurtleSerializer<W> {
    /// Buffers one triple.
    pub fn serialize_triple<'a>(&mut self, triple: impl Into<TripleRef<'a>>) {
        self.graph.insert(triple);
    }

    /// Buffers every triple of `graph`.
    pub fn serialize_graph(&mut self, graph: &Graph) {
        for triple in graph {
            self.graph.insert(triple);
        }
    }

    /// Serializes the buffered graph and returns the underlying writer.
    pub fn finish(self) -> Result<W, WriterError> {
        let mut run = SerializationRun {
            graph: &self.graph,
            base: self.options.base.clone(),
            prefix_table: self.options.prefixes.clone(),
            standard_prefixes: self.options.standard_prefixes,
            max_depth: self.options.max_depth,
            canonicalize: self.options.canonicalize,
            references: HashMap::new(),
            subject_set: HashSet::new(),
            serialized: HashSet::new(),
            qname_cache: HashMap::new(),
            used_prefixes: BTreeSet::new(),
            body: String::new(),
        };
        run.preprocess()?;
        run.write_body();

        let mut writer = self.writer;
        let mut wrote_preamble = false;
        if let Some(base) = &run.base {
            writeln!(writer, "@base <{}> .", base.as_str())?;
            wrote_preamble = true;
        }
        for (name, namespace) in &run.prefix_table {
            if run.used_prefixes.contains(name) {
                writeln!(writer, "@prefix {name}: <{namespace}> .")?;
                wrote_preamble = true;
            }
        }
        if wrote_preamble && !run.body.is_empty() {
            writeln!(writer)?;
        }
        writer.write_all(run.body.as_bytes())?;
        Ok(writer)
    }
}

/// The per-run state: reference counts, the serialized set, and the prefix
/// and QName tables, rebuilt at the start of every serialization.
struct SerializationRun<'a> {
    graph: &'a Graph,
    base: Option<Iri<String>>,
    prefix_table: BTreeMap<String, String>,
    standard_prefixes: bool,
    max_depth: usize,
    canonicalize: bool,
    references: HashMap<Term, usize>,
    subject_set: HashSet<Subject>,
    serialized: HashSet<Subject>,
    qname_cache: HashMap<String, Option<String>>,
    used_prefixes: BTreeSet<String>,
    body: String,
}

impl SerializationRun<'_> {
    /// Counts references, collects subjects, validates IRIs, and warms the
    /// QName cache (which also discovers standard prefixes).
    fn preprocess(&mut self) -> Result<(), WriterError> {
        for triple in self.graph {
            if let oxrdf::SubjectRef::NamedNode(node) = triple.subject {
                self.check_iri(node)?;
                self.compute_qname(node.as_str());
            }
            self.check_iri(triple.predicate)?;
            self.compute_qname(triple.predicate.as_str());
            match triple.object {
                oxrdf::TermRef::NamedNode(node) => {
                    self.check_iri(node)?;
                    self.compute_qname(node.as_str());
                }
                oxrdf::TermRef::Literal(literal) => {
                    self.compute_qname(literal.datatype().as_str());
                }
                oxrdf::TermRef::BlankNode(_) => {}
            }
            *self
                .references
                .entry(triple.predicate.into_owned().into())
                .or_insert(0) += 1;
            *self.references.entry(triple.object.into_owned()).or_insert(0) += 1;
            self.subject_set.insert(triple.subject.into_owned());
        }
        Ok(())
    }

    fn check_iri(&self, node: NamedNodeRef<'_>) -> Result<(), WriterError> {
        Iri::parse(node.as_str()).map_err(|e| WriterError::InvalidIri {
            iri: node.as_str().to_owned(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    fn write_body(&mut self) {
        for subject in self.order_subjects() {
            if !self.serialized.contains(&subject) {
                self.statement(&subject, 0);
            }
        }
        // Depth cutoffs and shared list heads can leave pockets behind; sweep
        // until every subject is out.
        loop {
            let remaining: Vec<Subject> = self
                .order_subjects()
                .into_iter()
                .filter(|s| !self.serialized.contains(s))
                .collect();
            if remaining.is_empty() {
                return;
            }
            for subject in remaining {
                if !self.serialized.contains(&subject) {
                    self.statement(&subject, 0);
                }
            }
        }
    }

    /// Subject order: the base IRI first, then instances of the top classes
    /// sorted by IRI, then everything else by (blankness, reference count,
    /// term), so scarcely referenced named resources lead and blank nodes
    /// trail.
    fn order_subjects(&self) -> Vec<Subject> {
        let mut ordered = Vec::new();
        let mut seen = HashSet::new();
        if let Some(base) = &self.base {
            let base_subject = Subject::from(NamedNode::new_unchecked(base.as_str()));
            if self.subject_set.contains(&base_subject) {
                seen.insert(base_subject.clone());
                ordered.push(base_subject);
            }
        }
        let mut class_instances: Vec<Subject> = self
            .graph
            .subjects_for_predicate_object(rdf::TYPE, rdfs::CLASS)
            .map(|s| s.into_owned())
            .filter(|s| !seen.contains(s))
            .collect();
        class_instances.sort_by_key(ToString::to_string);
        class_instances.dedup();
        for subject in class_instances {
            if seen.insert(subject.clone()) {
                ordered.push(subject);
            }
        }
        let mut rest: Vec<(u8, usize, String, Subject)> = self
            .subject_set
            .iter()
            .filter(|s| !seen.contains(*s))
            .map(|s| {
                let blank = u8::from(matches!(s, Subject::BlankNode(_)));
                (blank, self.subject_ref_count(s), s.to_string(), s.clone())
            })
            .collect();
        rest.sort_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)));
        ordered.extend(rest.into_iter().map(|(_, _, _, s)| s));
        ordered
    }

    fn subject_ref_count(&self, subject: &Subject) -> usize {
        self.references
            .get(&Term::from(subject.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn term_ref_count(&self, term: &Term) -> usize {
        self.references.get(term).copied().unwrap_or(0)
    }

    fn properties_for(&self, subject: &Subject) -> BTreeMap<NamedNode, Vec<Term>> {
        let mut properties: BTreeMap<NamedNode, Vec<Term>> = BTreeMap::new();
        for triple in self.graph.triples_for_subject(subject.as_ref()) {
            properties
                .entry(triple.predicate.into_owned())
                .or_default()
                .push(triple.object.into_owned());
        }
        properties
    }

    /// Emits one subject block.
    fn statement(&mut self, subject: &Subject, depth: usize) {
        self.serialized.insert(subject.clone());
        let properties = self.properties_for(subject);
        if properties.is_empty() {
            return;
        }
        if matches!(subject, Subject::BlankNode(_)) && self.subject_ref_count(subject) == 0 {
            let head = Term::from(subject.clone());
            if let Some(chain) = self.list_chain(&head, true) {
                if self.chain_is_exclusive(&chain) {
                    // A collection in subject position: the chain is consumed
                    // by the `( … )` form, whatever else the head carries
                    // follows as an ordinary predicate list.
                    let collection = self.collection_text(&chain, depth);
                    let extras = Self::without_list_pair(&properties);
                    self.body.push_str(&collection);
                    if !extras.is_empty() {
                        let predicates = self.predicate_list_text(&extras, depth);
                        self.body.push(' ');
                        self.body.push_str(&predicates);
                    }
                    self.body.push_str(" .\n");
                    return;
                }
                // A chain node is shared: fall through to the labeled form,
                // which keeps the raw rdf:first/rdf:rest pair so the shared
                // node stays addressable.
            } else {
                // An unreferenced blank subject nests its whole description.
                let predicates = self.predicate_list_text(&properties, depth + 1);
                self.body.push_str("[ ");
                self.body.push_str(&predicates);
                self.body.push_str(" ] .\n");
                return;
            }
        }
        let subject_text = self.subject_text(subject);
        let predicates = self.predicate_list_text(&properties, depth);
        self.body.push_str(&subject_text);
        self.body.push(' ');
        self.body.push_str(&predicates);
        self.body.push_str(" .\n");
    }

    /// The properties of a list node minus its rdf:first/rdf:rest pair.
    /// Collection syntax is the only rendering allowed to drop the pair;
    /// every other path keeps it so no triple is lost.
    fn without_list_pair(
        properties: &BTreeMap<NamedNode, Vec<Term>>,
    ) -> BTreeMap<NamedNode, Vec<Term>> {
        let first = rdf::FIRST.into_owned();
        let rest = rdf::REST.into_owned();
        properties
            .iter()
            .filter(|(predicate, _)| **predicate != first && **predicate != rest)
            .map(|(predicate, objects)| (predicate.clone(), objects.clone()))
            .collect()
    }

    /// Whether a chain may print as `( … )`: the head is referenced at most
    /// once and every interior node exactly once (by its predecessor's
    /// rdf:rest) and not yet consumed. Independent of rendering order, so
    /// two heads sharing a tail both keep the labeled form.
    fn chain_is_exclusive(&self, chain: &[(BlankNode, Term)]) -> bool {
        chain.iter().enumerate().all(|(i, (node, _))| {
            let refs = self.term_ref_count(&Term::from(node.clone()));
            if i == 0 {
                refs <= 1
            } else {
                refs == 1 && !self.serialized.contains(&Subject::from(node.clone()))
            }
        })
    }

    fn predicate_list_text(
        &mut self,
        properties: &BTreeMap<NamedNode, Vec<Term>>,
        depth: usize,
    ) -> String {
        let indent = "\t".repeat(depth + 1);
        let mut out = String::new();
        for (i, (predicate, objects)) in self.sort_properties(properties).into_iter().enumerate() {
            if i > 0 {
                out.push_str(" ;\n");
                out.push_str(&indent);
            }
            out.push_str(&self.predicate_text(&predicate));
            for (j, object) in objects.iter().enumerate() {
                out.push_str(if j > 0 { " , " } else { " " });
                let path = self.path(object, depth);
                out.push_str(&path);
            }
        }
        out
    }

    /// Predicate order: `rdf:type` (printed as `a`), `rdfs:label`, `dc:title`,
    /// then the rest lexicographically with `rdf:_N` container properties
    /// compared numerically. Objects sort by their printed term.
    fn sort_properties(
        &self,
        properties: &BTreeMap<NamedNode, Vec<Term>>,
    ) -> Vec<(NamedNode, Vec<Term>)> {
        let mut entries: Vec<(NamedNode, Vec<Term>)> = properties
            .iter()
            .map(|(p, objects)| {
                let mut objects = objects.clone();
                objects.sort_by_key(ToString::to_string);
                (p.clone(), objects)
            })
            .collect();
        entries.sort_by(|(a, _), (b, _)| compare_predicates(a, b));
        entries
    }

    fn predicate_text(&mut self, predicate: &NamedNode) -> String {
        if predicate.as_ref() == rdf::TYPE {
            return "a".to_owned();
        }
        self.named_node_text(predicate)
    }

    /// Picks the representation of one object: a collection for a well-formed
    /// list, a nested `[ … ]` for an otherwise unreferenced blank node, the
    /// plain value otherwise. `max_depth` cuts nesting; whatever is cut off
    /// falls back to its label and is emitted standalone later.
    fn path(&mut self, object: &Term, depth: usize) -> String {
        if depth < self.max_depth {
            if let Some(chain) = self.list_chain(object, false) {
                let head_fresh = match object {
                    Term::BlankNode(node) => {
                        !self.serialized.contains(&Subject::from(node.clone()))
                    }
                    _ => true,
                };
                if chain.is_empty() || (head_fresh && self.chain_is_exclusive(&chain)) {
                    return self.collection_text(&chain, depth);
                }
                // A chain node is shared: the nested form below keeps the
                // raw rdf:first/rdf:rest pair so the shared node stays
                // addressable by label.
            }
            if let Term::BlankNode(node) = object {
                let subject = Subject::from(node.clone());
                if !self.serialized.contains(&subject) && self.term_ref_count(object) <= 1 {
                    self.serialized.insert(subject.clone());
                    let properties = self.properties_for(&subject);
                    if properties.is_empty() {
                        return "[]".to_owned();
                    }
                    let predicates = self.predicate_list_text(&properties, depth + 1);
                    return format!("[ {predicates} ]");
                }
            }
        }
        self.term_text(object)
    }

    /// Prints `( item … )`, consuming the chain nodes.
    fn collection_text(&mut self, chain: &[(BlankNode, Term)], depth: usize) -> String {
        let mut parts = Vec::with_capacity(chain.len());
        for (node, item) in chain {
            self.serialized.insert(Subject::from(node.clone()));
            parts.push(self.path(item, depth + 1));
        }
        if parts.is_empty() {
            "()".to_owned()
        } else {
            format!("( {} )", parts.join(" "))
        }
    }

    /// Follows `rdf:first`/`rdf:rest` links from `head` to `rdf:nil`,
    /// requiring exactly one of each per node and no other properties on the
    /// chain (the head may carry extras when `allow_extra_at_head`, for
    /// collections in subject position). Returns the `(node, item)` chain,
    /// empty for `rdf:nil` itself.
    fn list_chain(&self, head: &Term, allow_extra_at_head: bool) -> Option<Vec<(BlankNode, Term)>> {
        let nil = Term::from(NamedNode::from(rdf::NIL));
        if *head == nil {
            return Some(Vec::new());
        }
        let first = rdf::FIRST.into_owned();
        let rest = rdf::REST.into_owned();
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut cursor = head.clone();
        loop {
            let Term::BlankNode(node) = cursor else {
                return None;
            };
            if !visited.insert(node.clone()) {
                return None;
            }
            let properties = self.properties_for(&Subject::from(node.clone()));
            let firsts = properties.get(&first)?;
            let rests = properties.get(&rest)?;
            if firsts.len() != 1 || rests.len() != 1 {
                return None;
            }
            let has_extra = properties.keys().any(|p| *p != first && *p != rest);
            if has_extra && !(allow_extra_at_head && chain.is_empty()) {
                return None;
            }
            chain.push((node, firsts[0].clone()));
            let next = rests[0].clone();
            if next == nil {
                return Some(chain);
            }
            cursor = next;
        }
    }

    fn subject_text(&mut self, subject: &Subject) -> String {
        match subject {
            Subject::NamedNode(node) => self.named_node_text(node),
            Subject::BlankNode(node) => node.to_string(),
            #[allow(unreachable_patterns)]
            _ => subject.to_string(),
        }
    }

    fn term_text(&mut self, term: &Term) -> String {
        match term {
            Term::NamedNode(node) => self.named_node_text(node),
            Term::BlankNode(node) => node.to_string(),
            Term::Literal(literal) => self.literal_text(literal),
        }
    }

    fn named_node_text(&mut self, node: &NamedNode) -> String {
        if let Some(qname) = self.qname_for_output(node.as_str()) {
            return qname;
        }
        if let Some(base) = &self.base {
            if let Some(relative) = node.as_str().strip_prefix(base.as_str()) {
                return format!("<{relative}>");
            }
        }
        format!("<{}>", node.as_str())
    }

    /// The QName for `iri`, marking its prefix as used in the output.
    fn qname_for_output(&mut self, iri: &str) -> Option<String> {
        let qname = self.compute_qname(iri)?;
        if let Some((prefix, _)) = qname.split_once(':') {
            self.used_prefixes.insert(prefix.to_owned());
        }
        Some(qname)
    }

    /// Finds the longest declared namespace that `iri` starts with and forms
    /// `prefix:local`; with standard prefixes on, well-known vocabularies are
    /// registered on first sight. Locals that do not fit the QName grammar
    /// yield no QName. Results are cached.
    fn compute_qname(&mut self, iri: &str) -> Option<String> {
        if let Some(cached) = self.qname_cache.get(iri) {
            return cached.clone();
        }
        let mut best: Option<(String, String)> = None;
        for (name, namespace) in &self.prefix_table {
            if iri.starts_with(namespace.as_str())
                && best.as_ref().is_none_or(|(_, b)| namespace.len() > b.len())
            {
                best = Some((name.clone(), namespace.clone()));
            }
        }
        if best.is_none() && self.standard_prefixes {
            for namespace in STANDARD_VOCABULARIES {
                if !iri.starts_with(namespace) {
                    continue;
                }
                if let Some(prefix) = synthetic_prefix(namespace) {
                    if !self.prefix_table.contains_key(&prefix) {
                        self.prefix_table
                            .insert(prefix.clone(), (*namespace).to_owned());
                        best = Some((prefix, (*namespace).to_owned()));
                    }
                }
                break;
            }
        }
        let qname = best.and_then(|(name, namespace)| {
            let local = &iri[namespace.len()..];
            matches_full(&QNAME_LOCAL, local).then(|| format!("{name}:{local}"))
        });
        self.qname_cache.insert(iri.to_owned(), qname.clone());
        qname
    }

    fn literal_text(&mut self, literal: &Literal) -> String {
        let datatype = literal.datatype();
        let mut value = literal.value().to_owned();
        if self.canonicalize {
            value = canonical_form(&value, datatype);
        }
        if datatype == xsd::BOOLEAN && (value == "true" || value == "false") {
            return value;
        }
        if datatype == xsd::INTEGER && matches_full(&BARE_INTEGER, &value) {
            return value;
        }
        if datatype == xsd::DECIMAL && matches_full(&BARE_DECIMAL, &value) {
            return value;
        }
        if datatype == xsd::DOUBLE && matches_full(&BARE_DOUBLE, &value) {
            return value.replace('E', "e");
        }
        let quoted = quote_string(&value);
        if let Some(language) = literal.language() {
            return format!("{quoted}@{language}");
        }
        if datatype == xsd::STRING {
            return quoted;
        }
        let datatype_text = self.named_node_text(&datatype.into_owned());
        format!("{quoted}^^{datatype_text}")
    }
}

fn compare_predicates(a: &NamedNode, b: &NamedNode) -> Ordering {
    fn rank(p: &NamedNode) -> u8 {
        if p.as_ref() == rdf::TYPE {
            0
        } else if p.as_ref() == rdfs::LABEL {
            1
        } else if p.as_ref() == DC_TITLE {
            2
        } else {
            3
        }
    }
    fn container_index(p: &NamedNode) -> Option<u64> {
        p.as_str()
            .strip_prefix("http://www.w3.org/1999/02/22-rdf-syntax-ns#_")?
            .parse()
            .ok()
    }
    rank(a).cmp(&rank(b)).then_with(|| {
        match (container_index(a), container_index(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => a.as_str().cmp(b.as_str()),
        }
    })
}

/// The last path segment of a namespace IRI, lowercased, if it makes a valid
/// prefix name.
fn synthetic_prefix(namespace: &str) -> Option<String> {
    let trimmed = namespace.trim_end_matches(['#', '/']);
    let segment = trimmed.rsplit('/').next()?;
    let prefix = segment.to_ascii_lowercase();
    matches_full(&PREFIX_NAME, &prefix).then_some(prefix)
}

fn canonical_form(value: &str, datatype: NamedNodeRef<'_>) -> String {
    if datatype == xsd::BOOLEAN {
        if let Ok(parsed) = value.parse::<oxsdatatypes::Boolean>() {
            return parsed.to_string();
        }
    } else if datatype == xsd::INTEGER {
        if let Ok(parsed) = value.parse::<oxsdatatypes::Integer>() {
            return parsed.to_string();
        }
    } else if datatype == xsd::DECIMAL {
        if let Ok(parsed) = value.parse::<oxsdatatypes::Decimal>() {
            return parsed.to_string();
        }
    } else if datatype == xsd::DOUBLE {
        if let Ok(parsed) = value.parse::<oxsdatatypes::Double>() {
            return parsed.to_string();
        }
    }
    value.to_owned()
}

/// Quotes a literal value: values containing tabs, newlines, or carriage
/// returns use the long form, everything else the single-line form with the
/// standard escapes.
fn quote_string(value: &str) -> String {
    if value.contains(['\t', '\n', '\r']) {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        return format!("\"\"\"{escaped}\"\"\"");
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{C}' => out.push_str("\\f"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
