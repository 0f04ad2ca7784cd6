//! Path expressions over a parsed `scraper` tree
//!
//! Two syntaxes are understood:
//! - an XPath subset (`//div[@id='x']/span[2]`, `.//li[contains(@class,'item')]`)
//! - CSS selectors behind a `css:` prefix (`css:div.price > span`)
//!
//! Paths are always evaluated relative to the element they are queried on, so a
//! leading `/` or `//` never escapes to the document root.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use scraper::{ElementRef, Html, Selector};

use crate::error::PathError;

/// A node a path can start from or land on.
#[derive(Clone, Copy)]
pub(crate) enum Anchor<'a> {
    Document(&'a Html),
    Element(ElementRef<'a>),
}

impl<'a> Anchor<'a> {
    fn child_elements(self) -> Vec<ElementRef<'a>> {
        match self {
            Anchor::Document(html) => vec![html.root_element()],
            Anchor::Element(el) => el.children().filter_map(ElementRef::wrap).collect(),
        }
    }

    /// The anchor itself followed by every element below it, in document order.
    fn self_and_descendants(self) -> Vec<Anchor<'a>> {
        let below = match self {
            Anchor::Document(html) => html.root_element(),
            Anchor::Element(el) => el,
        };
        let mut nodes = Vec::new();
        if matches!(self, Anchor::Document(_)) {
            nodes.push(self);
        }
        nodes.extend(below.descendants().filter_map(ElementRef::wrap).map(Anchor::Element));
        nodes
    }

    /// Parent element; the document node is not reachable through `..`.
    fn parent(self) -> Option<Anchor<'a>> {
        let Anchor::Element(el) = self else {
            return None;
        };
        el.parent().and_then(ElementRef::wrap).map(Anchor::Element)
    }

    pub(crate) fn element(self) -> Option<ElementRef<'a>> {
        match self {
            Anchor::Element(el) => Some(el),
            Anchor::Document(_) => None,
        }
    }

    /// Concatenated descendant text.
    pub(crate) fn string_value(self) -> String {
        match self {
            Anchor::Document(html) => html.root_element().text().collect(),
            Anchor::Element(el) => el.text().collect(),
        }
    }

    fn own_text(self) -> Option<String> {
        let el = self.element()?;
        let texts: Vec<&str> = el
            .children()
            .filter_map(|node| node.value().as_text().map(|t| &**t))
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }

    pub(crate) fn attr(self, name: &str) -> Option<&'a str> {
        self.element().and_then(|el| el.value().attr(name))
    }
}

/// A compiled path expression.
pub(crate) enum CompiledPath {
    XPath(PathExpr),
    Css(Selector),
}

impl CompiledPath {
    pub(crate) fn evaluate<'a>(&self, context: Anchor<'a>) -> Vec<Anchor<'a>> {
        match self {
            CompiledPath::XPath(expr) => expr.evaluate(context),
            CompiledPath::Css(selector) => match context {
                Anchor::Document(html) => html.select(selector).map(Anchor::Element).collect(),
                Anchor::Element(el) => el.select(selector).map(Anchor::Element).collect(),
            },
        }
    }
}

/// Cache of compiled path expressions, keyed by their source text.
///
/// One cache may be shared by many documents through `Arc`.
#[derive(Default)]
pub struct PathCache {
    compiled: RwLock<HashMap<String, Arc<CompiledPath>>>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn compile(&self, path: &str) -> Result<Arc<CompiledPath>, PathError> {
        {
            let compiled = self.compiled.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = compiled.get(path) {
                return Ok(Arc::clone(hit));
            }
        }

        let fresh = Arc::new(compile(path)?);
        let mut compiled = self.compiled.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(compiled.entry(path.to_string()).or_insert(fresh)))
    }

    /// Number of distinct expressions compiled so far.
    pub fn len(&self) -> usize {
        self.compiled.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.compiled.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Compile a path without caching.
pub(crate) fn compile(path: &str) -> Result<CompiledPath, PathError> {
    if let Some(css) = path.trim_start().strip_prefix("css:") {
        let css = css.trim();
        return Selector::parse(css)
            .map(CompiledPath::Css)
            .map_err(|e| PathError::Selector {
                selector: css.to_string(),
                reason: e.to_string(),
            });
    }
    Parser::new(path).parse_path().map(CompiledPath::XPath)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    SelfNode,
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    AnyNode,
    AnyElement,
    Tag(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    Last,
    Filter(Condition),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Condition {
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Exists(Operand),
    Equals(Operand, String),
    NotEquals(Operand, String),
    Contains(Operand, String),
    StartsWith(Operand, String),
    HasChild(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Attr(String),
    Text,
    StringValue,
    Normalized(Box<Operand>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

/// Parsed XPath-subset expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PathExpr {
    steps: Vec<Step>,
}

impl PathExpr {
    fn evaluate<'a>(&self, context: Anchor<'a>) -> Vec<Anchor<'a>> {
        let mut current = vec![context];

        for step in &self.steps {
            let mut next = Vec::new();
            let mut groups = 0usize;
            for node in &current {
                for group in step.candidate_groups(*node) {
                    groups += 1;
                    next.extend(step.select(group));
                }
            }
            current = if groups > 1 { document_order(next) } else { next };
            if current.is_empty() {
                break;
            }
        }

        current
    }
}

impl Step {
    /// Candidate lists the predicates apply to; positions are per list.
    fn candidate_groups<'a>(&self, node: Anchor<'a>) -> Vec<Vec<Anchor<'a>>> {
        match self.axis {
            Axis::Child => vec![self.filter(node.child_elements().into_iter().map(Anchor::Element))],
            Axis::Descendant => node
                .self_and_descendants()
                .into_iter()
                .map(|n| self.filter(n.child_elements().into_iter().map(Anchor::Element)))
                .filter(|group| !group.is_empty())
                .collect(),
            Axis::SelfNode => vec![self.filter(std::iter::once(node))],
            Axis::Parent => vec![self.filter(node.parent())],
        }
    }

    fn filter<'a>(&self, nodes: impl IntoIterator<Item = Anchor<'a>>) -> Vec<Anchor<'a>> {
        nodes.into_iter().filter(|n| self.test.matches(*n)).collect()
    }

    fn select<'a>(&self, mut group: Vec<Anchor<'a>>) -> Vec<Anchor<'a>> {
        for predicate in &self.predicates {
            group = match predicate {
                Predicate::Position(n) => group.get(n - 1).copied().into_iter().collect(),
                Predicate::Last => group.last().copied().into_iter().collect(),
                Predicate::Filter(cond) => group.into_iter().filter(|n| cond.holds(*n)).collect(),
            };
        }
        group
    }
}

impl NodeTest {
    fn matches(&self, node: Anchor<'_>) -> bool {
        match (self, node) {
            (NodeTest::AnyNode, _) => true,
            (NodeTest::AnyElement, Anchor::Element(_)) => true,
            (NodeTest::Tag(tag), Anchor::Element(el)) => el.value().name().eq_ignore_ascii_case(tag),
            _ => false,
        }
    }
}

impl Condition {
    fn holds(&self, node: Anchor<'_>) -> bool {
        match self {
            Condition::And(a, b) => a.holds(node) && b.holds(node),
            Condition::Or(a, b) => a.holds(node) || b.holds(node),
            Condition::Not(inner) => !inner.holds(node),
            Condition::Exists(op) => op.value(node).is_some(),
            Condition::Equals(op, lit) => op.value(node).is_some_and(|v| v == *lit),
            Condition::NotEquals(op, lit) => op.value(node).is_some_and(|v| v != *lit),
            Condition::Contains(op, lit) => op.value(node).is_some_and(|v| v.contains(lit.as_str())),
            Condition::StartsWith(op, lit) => {
                op.value(node).is_some_and(|v| v.starts_with(lit.as_str()))
            }
            Condition::HasChild(tag) => node
                .child_elements()
                .iter()
                .any(|c| c.value().name().eq_ignore_ascii_case(tag)),
        }
    }
}

impl Operand {
    fn value(&self, node: Anchor<'_>) -> Option<String> {
        match self {
            Operand::Attr(name) => node.attr(name).map(String::from),
            Operand::Text => node.own_text(),
            Operand::StringValue => Some(node.string_value()),
            Operand::Normalized(inner) => inner
                .value(node)
                .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" ")),
        }
    }
}

/// Deduplicate and sort anchors that came from several candidate lists.
fn document_order(nodes: Vec<Anchor<'_>>) -> Vec<Anchor<'_>> {
    let Some(first) = nodes.first().copied() else {
        return nodes;
    };
    let order: Vec<_> = match first {
        Anchor::Document(html) => html.tree.root().descendants().map(|n| n.id()).collect(),
        Anchor::Element(el) => el.tree().root().descendants().map(|n| n.id()).collect(),
    };

    let mut by_id = HashMap::new();
    for node in nodes {
        let id = match node {
            Anchor::Document(html) => html.tree.root().id(),
            Anchor::Element(el) => el.id(),
        };
        by_id.entry(id).or_insert(node);
    }

    let mut seen = HashSet::new();
    order
        .into_iter()
        .filter(|id| seen.insert(*id))
        .filter_map(|id| by_id.get(&id).copied())
        .collect()
}

struct Parser<'p> {
    src: &'p str,
    pos: usize,
}

impl<'p> Parser<'p> {
    fn new(src: &'p str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, reason: impl Into<String>) -> PathError {
        PathError::Syntax {
            path: self.src.to_string(),
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn rest(&self) -> &'p str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), PathError> {
        self.skip_ws();
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{token}`")))
        }
    }

    /// Consume `name(` allowing whitespace before the parenthesis.
    fn eat_function(&mut self, name: &str) -> bool {
        let rest = self.rest();
        let Some(after) = rest.strip_prefix(name) else {
            return false;
        };
        let after_ws = after.trim_start();
        if after_ws.starts_with('(') {
            self.pos += rest.len() - after_ws.len() + 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let rest = self.rest();
        match rest.strip_prefix(keyword) {
            Some(after) if !after.starts_with(is_name_char) => {
                self.pos += keyword.len();
                true
            }
            _ => false,
        }
    }

    fn name(&mut self) -> Option<&'p str> {
        let rest = self.rest();
        if !rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            return None;
        }
        let len = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
        self.pos += len;
        Some(&rest[..len])
    }

    fn parse_path(mut self) -> Result<PathExpr, PathError> {
        self.skip_ws();
        if self.rest().is_empty() {
            return Err(self.error("empty path"));
        }

        let mut axis = if self.eat(".//") || self.eat("//") {
            Axis::Descendant
        } else {
            if !self.eat("./") {
                self.eat("/");
            }
            Axis::Child
        };

        let mut steps = Vec::new();
        loop {
            self.skip_ws();
            steps.push(self.parse_step(axis)?);
            self.skip_ws();
            if self.rest().is_empty() {
                break;
            }
            axis = if self.eat("//") {
                Axis::Descendant
            } else if self.eat("/") {
                Axis::Child
            } else {
                return Err(self.error("expected `/` or end of path"));
            };
        }

        Ok(PathExpr { steps })
    }

    fn parse_step(&mut self, axis: Axis) -> Result<Step, PathError> {
        let (axis, test) = if self.eat("..") {
            if axis == Axis::Descendant {
                return Err(self.error("`//..` is not supported"));
            }
            (Axis::Parent, NodeTest::AnyNode)
        } else if self.eat(".") {
            if axis == Axis::Descendant {
                return Err(self.error("`//.` is not supported"));
            }
            (Axis::SelfNode, NodeTest::AnyNode)
        } else if self.eat("*") {
            (axis, NodeTest::AnyElement)
        } else if self.rest().starts_with('@') {
            return Err(self.error("attribute steps are not supported; read attributes through the field"));
        } else if let Some(name) = self.name() {
            if self.rest().trim_start().starts_with('(') {
                return Err(self.error(format!("`{name}()` is not supported as a step")));
            }
            (axis, NodeTest::Tag(name.to_ascii_lowercase()))
        } else {
            return Err(self.error("expected a step"));
        };

        let mut predicates = Vec::new();
        loop {
            self.skip_ws();
            if !self.eat("[") {
                break;
            }
            predicates.push(self.parse_predicate()?);
            self.expect("]")?;
        }

        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_predicate(&mut self) -> Result<Predicate, PathError> {
        self.skip_ws();
        let rest = self.rest();
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits > 0 {
            let n: usize = rest[..digits]
                .parse()
                .map_err(|_| self.error("position out of range"))?;
            if n == 0 {
                return Err(self.error("positions start at 1"));
            }
            self.pos += digits;
            return Ok(Predicate::Position(n));
        }
        if self.eat_function("last") {
            self.expect(")")?;
            return Ok(Predicate::Last);
        }
        self.parse_or().map(Predicate::Filter)
    }

    fn parse_or(&mut self) -> Result<Condition, PathError> {
        let mut lhs = self.parse_and()?;
        loop {
            self.skip_ws();
            if !self.eat_keyword("or") {
                return Ok(lhs);
            }
            let rhs = self.parse_and()?;
            lhs = Condition::Or(Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_and(&mut self) -> Result<Condition, PathError> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_ws();
            if !self.eat_keyword("and") {
                return Ok(lhs);
            }
            let rhs = self.parse_unary()?;
            lhs = Condition::And(Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Condition, PathError> {
        self.skip_ws();

        if self.eat_function("not") {
            let inner = self.parse_or()?;
            self.expect(")")?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        if self.eat("(") {
            let inner = self.parse_or()?;
            self.expect(")")?;
            return Ok(inner);
        }
        if self.eat_function("contains") {
            let (op, lit) = self.parse_string_call()?;
            return Ok(Condition::Contains(op, lit));
        }
        if self.eat_function("starts-with") {
            let (op, lit) = self.parse_string_call()?;
            return Ok(Condition::StartsWith(op, lit));
        }

        let rest = self.rest();
        let operand_ahead = rest.starts_with('@')
            || rest.starts_with('.')
            || rest.starts_with("text")
            || rest.starts_with("normalize-space");
        if operand_ahead {
            if let Some(op) = self.try_operand()? {
                self.skip_ws();
                if self.eat("!=") {
                    return Ok(Condition::NotEquals(op, self.parse_literal()?));
                }
                if self.eat("=") {
                    return Ok(Condition::Equals(op, self.parse_literal()?));
                }
                return Ok(Condition::Exists(op));
            }
        }

        match self.name() {
            Some(tag) => Ok(Condition::HasChild(tag.to_ascii_lowercase())),
            None => Err(self.error("expected a condition")),
        }
    }

    fn parse_string_call(&mut self) -> Result<(Operand, String), PathError> {
        self.skip_ws();
        let op = self
            .try_operand()?
            .ok_or_else(|| self.error("expected `@attr`, `text()`, `.` or `normalize-space()`"))?;
        self.expect(",")?;
        let lit = self.parse_literal()?;
        self.expect(")")?;
        Ok((op, lit))
    }

    fn try_operand(&mut self) -> Result<Option<Operand>, PathError> {
        self.skip_ws();
        if self.eat("@") {
            let name = self.name().ok_or_else(|| self.error("expected attribute name"))?;
            return Ok(Some(Operand::Attr(name.to_string())));
        }
        if self.eat_function("text") {
            self.expect(")")?;
            return Ok(Some(Operand::Text));
        }
        if self.eat_function("normalize-space") {
            self.skip_ws();
            if self.eat(")") {
                return Ok(Some(Operand::Normalized(Box::new(Operand::StringValue))));
            }
            let inner = self
                .try_operand()?
                .ok_or_else(|| self.error("expected an argument"))?;
            self.expect(")")?;
            return Ok(Some(Operand::Normalized(Box::new(inner))));
        }
        if self.eat(".") {
            return Ok(Some(Operand::StringValue));
        }
        Ok(None)
    }

    fn parse_literal(&mut self) -> Result<String, PathError> {
        self.skip_ws();
        let quote = match self.rest().chars().next() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected a quoted string")),
        };
        self.pos += 1;
        let rest = self.rest();
        let end = rest
            .find(quote)
            .ok_or_else(|| self.error("unterminated string"))?;
        let literal = rest[..end].to_string();
        self.pos += end + 1;
        Ok(literal)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':'
}
