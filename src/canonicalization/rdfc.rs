//! RDF Dataset Canonicalization (RDFC-1.0).
//!
//! Documents are mapped to RDF directly, without JSON-LD context expansion:
//!
//! - Each JSON object is a node. Its `id` names it: `#fragment` ids resolve against the root `id`,
//!   ids containing `:` are IRIs, anything else (or no id) is a blank node.
//! - Keys that are absolute IRIs are used as predicates verbatim. Other keys are appended to the
//!   vocabulary IRI, taken from an `@vocab` entry in `@context` or [`DEFAULT_VOCAB`].
//! - `type` values become `rdf:type` objects. Strings, booleans and numbers become literals with
//!   their XSD datatype, arrays produce one triple per element, and `null` produces nothing.
//!
//! The resulting dataset is labeled with the RDFC-1.0 algorithm and serialized as sorted
//! canonical N-Quads.

use super::Error;
use itertools::Itertools as _;
use serde_json::{Map, Number, Value};
use sha2::{Digest as _, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub const DEFAULT_VOCAB: &str = "https://btc1.dev/context/v1#";

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";

const CANONICAL_PREFIX: &str = "c14n";
const TEMPORARY_PREFIX: &str = "b";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    Iri(String),
    /// Label without the `_:` prefix.
    BlankNode(String),
    Literal {
        value: String,
        datatype: String,
        language: Option<String>,
    },
}

impl Term {
    fn literal(value: impl Into<String>, datatype: &str) -> Self {
        Self::Literal {
            value: value.into(),
            datatype: datatype.to_string(),
            language: None,
        }
    }

    fn blank_label(&self) -> Option<&str> {
        match self {
            Self::BlankNode(label) => Some(label),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "<{iri}>"),
            Self::BlankNode(label) => write!(f, "_:{label}"),
            Self::Literal {
                value,
                datatype,
                language,
            } => {
                write!(f, "\"{}\"", escape_literal(value))?;
                if let Some(language) = language {
                    write!(f, "@{language}")
                } else if datatype != XSD_STRING {
                    write!(f, "^^<{datatype}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Quad {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
    pub graph: Option<Term>,
}

impl Quad {
    pub fn new(subject: Term, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
            graph: None,
        }
    }

    fn map_blank_nodes<F>(&self, relabel: F) -> Self
    where
        F: Fn(&str) -> String,
    {
        let map = |term: &Term| match term {
            Term::BlankNode(label) => Term::BlankNode(relabel(label)),
            other => other.clone(),
        };

        Self {
            subject: map(&self.subject),
            predicate: self.predicate.clone(),
            object: map(&self.object),
            graph: self.graph.as_ref().map(map),
        }
    }

    /// Canonical N-Quads line, including the terminating newline.
    fn to_nquad(&self) -> String {
        match &self.graph {
            Some(graph) => format!(
                "{} <{}> {} {graph} .\n",
                self.subject, self.predicate, self.object
            ),
            None => format!("{} <{}> {} .\n", self.subject, self.predicate, self.object),
        }
    }
}

/// Only backslash, double quote, LF and CR are escaped in canonical N-Quads.
fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }

    escaped
}

/// Map the document to RDF and return its canonical N-Quads.
pub fn canonicalize(document: &Value) -> Result<String, Error> {
    let dataset = to_dataset(document)?;

    Ok(canonicalize_dataset(&dataset))
}

/// Map a JSON document to an RDF dataset in the default graph.
pub fn to_dataset(document: &Value) -> Result<Vec<Quad>, Error> {
    let root = document.as_object().ok_or(Error::NotAnObject)?;

    let base = match root.get("id") {
        Some(Value::String(id)) if is_absolute_iri(id) => Some(id.clone()),
        _ => None,
    };

    let mut mapper = Mapper {
        base,
        vocab: find_vocab(root.get("@context")).unwrap_or(DEFAULT_VOCAB).to_string(),
        relative_ids: HashMap::new(),
        blank_counter: 0,
        quads: Vec::new(),
    };
    mapper.node(root)?;

    Ok(mapper.quads)
}

fn find_vocab(context: Option<&Value>) -> Option<&str> {
    match context? {
        Value::Object(map) => map.get("@vocab").and_then(Value::as_str),
        Value::Array(entries) => entries.iter().find_map(|entry| find_vocab(Some(entry))),
        _ => None,
    }
}

fn is_absolute_iri(value: &str) -> bool {
    let Some((scheme, _)) = value.split_once(':') else {
        return false;
    };

    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn flatten<'v>(value: &'v Value, out: &mut Vec<&'v Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| flatten(item, out)),
        other => out.push(other),
    }
}

struct Mapper {
    base: Option<String>,
    vocab: String,
    relative_ids: HashMap<String, String>,
    blank_counter: usize,
    quads: Vec<Quad>,
}

impl Mapper {
    fn fresh_blank(&mut self) -> Term {
        let label = format!("n{}", self.blank_counter);
        self.blank_counter += 1;

        Term::BlankNode(label)
    }

    /// Blank node ids from the document are relabeled along with relative ids, so they never
    /// collide with generated labels.
    fn node_id(&mut self, id: &str) -> Term {
        if let (Some(base), true) = (self.base.as_ref(), id.starts_with('#')) {
            return Term::Iri(format!("{base}{id}"));
        }
        if is_absolute_iri(id) {
            return Term::Iri(id.to_string());
        }

        if let Some(label) = self.relative_ids.get(id) {
            return Term::BlankNode(label.clone());
        }
        let term = self.fresh_blank();
        if let Term::BlankNode(label) = &term {
            self.relative_ids.insert(id.to_string(), label.clone());
        }

        term
    }

    fn vocab_iri(&self, term: &str) -> String {
        if is_absolute_iri(term) {
            term.to_string()
        } else {
            format!("{}{term}", self.vocab)
        }
    }

    fn node(&mut self, object: &Map<String, Value>) -> Result<Term, Error> {
        let subject = match object.get("id").or_else(|| object.get("@id")) {
            Some(Value::String(id)) => self.node_id(id),
            Some(_) => return Err(Error::RdfMapping("`id` must be a string".into())),
            None => self.fresh_blank(),
        };

        for (key, value) in object {
            let mut values = Vec::new();
            flatten(value, &mut values);

            match key.as_str() {
                "id" | "@id" | "@context" => {}
                "type" | "@type" => {
                    for ty in values {
                        let ty = ty.as_str().ok_or_else(|| {
                            Error::RdfMapping(format!("`{key}` values must be strings"))
                        })?;
                        let object = Term::Iri(self.vocab_iri(ty));
                        self.quads.push(Quad::new(subject.clone(), RDF_TYPE, object));
                    }
                }
                // Other JSON-LD keywords carry no triples here.
                key if key.starts_with('@') => {}
                key => {
                    let predicate = self.vocab_iri(key);
                    for item in values {
                        if let Some(object) = self.object(item)? {
                            self.quads
                                .push(Quad::new(subject.clone(), predicate.clone(), object));
                        }
                    }
                }
            }
        }

        Ok(subject)
    }

    fn object(&mut self, value: &Value) -> Result<Option<Term>, Error> {
        let term = match value {
            Value::Null => return Ok(None),
            Value::Bool(b) => Term::literal(b.to_string(), XSD_BOOLEAN),
            Value::Number(n) => number_literal(n),
            Value::String(s) => Term::literal(s.as_str(), XSD_STRING),
            Value::Object(map) if map.contains_key("@value") => self.value_object(map)?,
            Value::Object(map) => self.node(map)?,
            Value::Array(_) => {
                return Err(Error::RdfMapping("nested arrays are flattened first".into()));
            }
        };

        Ok(Some(term))
    }

    fn value_object(&self, map: &Map<String, Value>) -> Result<Term, Error> {
        let value = match &map["@value"] {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => match number_literal(n) {
                Term::Literal { value, .. } => value,
                _ => n.to_string(),
            },
            _ => return Err(Error::RdfMapping("`@value` must be a scalar".into())),
        };

        if let Some(language) = map.get("@language").and_then(Value::as_str) {
            return Ok(Term::Literal {
                value,
                datatype: RDF_LANG_STRING.to_string(),
                language: Some(language.to_lowercase()),
            });
        }

        let datatype = match map.get("@type").and_then(Value::as_str) {
            Some(ty) => self.vocab_iri(ty),
            None => XSD_STRING.to_string(),
        };

        Ok(Term::Literal {
            value,
            datatype,
            language: None,
        })
    }
}

fn number_literal(n: &Number) -> Term {
    if n.is_i64() || n.is_u64() {
        return Term::literal(n.to_string(), XSD_INTEGER);
    }

    let f = n.as_f64().unwrap_or_default();
    if f.fract() == 0.0 && f.abs() < 1e21 {
        return Term::literal(format!("{f:.0}"), XSD_INTEGER);
    }

    // Canonical xsd:double: one digit before the point, at least one after it.
    let formatted = format!("{f:E}");
    let formatted = match formatted.split_once('E') {
        Some((mantissa, exponent)) if !mantissa.contains('.') => {
            format!("{mantissa}.0E{exponent}")
        }
        _ => formatted,
    };

    Term::literal(formatted, XSD_DOUBLE)
}

/// Relabel blank nodes with RDFC-1.0 and return the sorted canonical N-Quads.
pub fn canonicalize_dataset(dataset: &[Quad]) -> String {
    let mut canonicalizer = Canonicalizer::new(dataset);
    canonicalizer.issue_canonical_labels();

    let canonical = &canonicalizer.canonical;
    let mut lines: Vec<String> = dataset
        .iter()
        .map(|quad| {
            quad.map_blank_nodes(|label| {
                canonical
                    .get(label)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| label.to_string())
            })
            .to_nquad()
        })
        .collect();

    lines.sort();
    lines.dedup();
    lines.concat()
}

#[derive(Clone, Debug)]
struct IdentifierIssuer {
    prefix: &'static str,
    issued: Vec<(String, String)>,
}

impl IdentifierIssuer {
    fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            issued: Vec::new(),
        }
    }

    fn get(&self, existing: &str) -> Option<&str> {
        self.issued
            .iter()
            .find(|(label, _)| label == existing)
            .map(|(_, issued)| issued.as_str())
    }

    fn issue(&mut self, existing: &str) -> String {
        if let Some(issued) = self.get(existing) {
            return issued.to_string();
        }

        let issued = format!("{}{}", self.prefix, self.issued.len());
        self.issued.push((existing.to_string(), issued.clone()));

        issued
    }
}

struct Canonicalizer<'a> {
    /// Blank node labels in first-seen order.
    blank_nodes: Vec<&'a str>,
    blank_to_quads: HashMap<&'a str, Vec<&'a Quad>>,
    first_degree: HashMap<&'a str, String>,
    canonical: IdentifierIssuer,
}

fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

impl<'a> Canonicalizer<'a> {
    fn new(dataset: &'a [Quad]) -> Self {
        let mut blank_nodes = Vec::new();
        let mut blank_to_quads: HashMap<&'a str, Vec<&'a Quad>> = HashMap::new();

        for quad in dataset {
            let terms = [Some(&quad.subject), Some(&quad.object), quad.graph.as_ref()];
            for label in terms.into_iter().flatten().filter_map(Term::blank_label) {
                let quads = blank_to_quads.entry(label).or_insert_with(|| {
                    blank_nodes.push(label);
                    Vec::new()
                });
                if !quads.iter().any(|q| std::ptr::eq(*q, quad)) {
                    quads.push(quad);
                }
            }
        }

        Self {
            blank_nodes,
            blank_to_quads,
            first_degree: HashMap::new(),
            canonical: IdentifierIssuer::new(CANONICAL_PREFIX),
        }
    }

    fn issue_canonical_labels(&mut self) {
        let mut hash_to_blank: BTreeMap<String, Vec<&'a str>> = BTreeMap::new();
        for &label in &self.blank_nodes {
            let hash = self.hash_first_degree(label);
            self.first_degree.insert(label, hash.clone());
            hash_to_blank.entry(hash).or_default().push(label);
        }

        for labels in hash_to_blank.values() {
            if let [label] = labels.as_slice() {
                self.canonical.issue(label);
            }
        }

        for labels in hash_to_blank.values().filter(|labels| labels.len() > 1) {
            let mut results = Vec::new();
            for &label in labels {
                if self.canonical.get(label).is_some() {
                    continue;
                }

                let mut temporary = IdentifierIssuer::new(TEMPORARY_PREFIX);
                temporary.issue(label);
                results.push(self.hash_n_degree(label, temporary));
            }

            results.sort_by(|(a, _), (b, _)| a.cmp(b));
            for (_, issuer) in results {
                for (existing, _) in issuer.issued {
                    self.canonical.issue(&existing);
                }
            }
        }
    }

    fn hash_first_degree(&self, reference: &str) -> String {
        let mut nquads: Vec<String> = self.blank_to_quads[reference]
            .iter()
            .map(|quad| {
                quad.map_blank_nodes(|label| {
                    let replacement = if label == reference { "a" } else { "z" };
                    replacement.to_string()
                })
                .to_nquad()
            })
            .collect();
        nquads.sort();

        sha256_hex(&nquads.concat())
    }

    fn hash_related(
        &self,
        related: &str,
        quad: &Quad,
        issuer: &IdentifierIssuer,
        position: char,
    ) -> String {
        let identifier = match (self.canonical.get(related), issuer.get(related)) {
            (Some(id), _) | (None, Some(id)) => format!("_:{id}"),
            (None, None) => self.first_degree[related].clone(),
        };

        let mut input = position.to_string();
        if position != 'g' {
            input.push_str(&format!("<{}>", quad.predicate));
        }
        input.push_str(&identifier);

        sha256_hex(&input)
    }

    fn hash_n_degree(
        &self,
        identifier: &str,
        mut issuer: IdentifierIssuer,
    ) -> (String, IdentifierIssuer) {
        let mut hash_to_related: BTreeMap<String, Vec<&'a str>> = BTreeMap::new();
        for &quad in &self.blank_to_quads[identifier] {
            let positions = [
                ('s', Some(&quad.subject)),
                ('o', Some(&quad.object)),
                ('g', quad.graph.as_ref()),
            ];
            for (position, term) in positions {
                let Some(related) = term.and_then(Term::blank_label) else {
                    continue;
                };
                if related == identifier {
                    continue;
                }
                let hash = self.hash_related(related, quad, &issuer, position);
                hash_to_related.entry(hash).or_default().push(related);
            }
        }

        let mut data_to_hash = String::new();
        for (related_hash, related_nodes) in &hash_to_related {
            data_to_hash.push_str(related_hash);

            let mut chosen_path = String::new();
            let mut chosen_issuer = None;

            'permutation: for permutation in related_nodes
                .iter()
                .copied()
                .permutations(related_nodes.len())
            {
                let mut issuer_copy = issuer.clone();
                let mut path = String::new();
                let mut recursion_list = Vec::new();

                for related in permutation {
                    if let Some(id) = self.canonical.get(related) {
                        path.push_str(&format!("_:{id}"));
                    } else {
                        if issuer_copy.get(related).is_none() {
                            recursion_list.push(related);
                        }
                        path.push_str(&format!("_:{}", issuer_copy.issue(related)));
                    }

                    if worse_path(&path, &chosen_path) {
                        continue 'permutation;
                    }
                }

                for related in recursion_list {
                    let (result_hash, result_issuer) =
                        self.hash_n_degree(related, issuer_copy.clone());
                    path.push_str(&format!("_:{}", issuer_copy.issue(related)));
                    path.push_str(&format!("<{result_hash}>"));
                    issuer_copy = result_issuer;

                    if worse_path(&path, &chosen_path) {
                        continue 'permutation;
                    }
                }

                if chosen_path.is_empty() || path < chosen_path {
                    chosen_path = path;
                    chosen_issuer = Some(issuer_copy);
                }
            }

            data_to_hash.push_str(&chosen_path);
            if let Some(chosen_issuer) = chosen_issuer {
                issuer = chosen_issuer;
            }
        }

        (sha256_hex(&data_to_hash), issuer)
    }
}

fn worse_path(path: &str, chosen_path: &str) -> bool {
    !chosen_path.is_empty() && path.len() >= chosen_path.len() && path > chosen_path
}
