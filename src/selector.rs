//! Node-set selection
//!
//! Rules locate the nodes they check with small XPath-like expressions such
//! as `//kml:Style[not(ancestor::kml:Update)]`. The [`Selector`] trait is the
//! seam the engine depends on. [`PathInterpreter`] implements it by parsing
//! expressions into a [`PathExpr`] AST and interpreting that AST over the
//! document arena.
//!
//! Supported grammar:
//!
//! ```text
//! expr      := path ('|' path)*
//! path      := '/' steps | '//' steps | steps
//! steps     := step (('/' | '//') step)*
//! step      := '.' | '..' | (axis '::')? test predicate*
//! test      := '*' | prefix ':' '*' | prefix ':' name | name
//! predicate := '[' (number | or) ']'
//! or        := and ('or' and)*
//! and       := unary ('and' unary)*
//! unary     := 'not' '(' or ')' | '(' or ')'
//!            | 'count' '(' path ')' cmp number
//!            | '@' name (('=' | '!=') literal)?
//!            | path (('=' | '!=') literal)?
//! ```
//!
//! Results are always returned in document order without duplicates.

use crate::catalog::Namespaces;
use crate::document::{Document, Node, NodeId};
use crate::error::SelectorError;

/// Capability to evaluate path expressions against a document
pub trait Selector: Send + Sync {
    /// Evaluate `expr` with `context` as the context node. Matching elements
    /// are returned in document order.
    fn select(
        &self,
        doc: &Document,
        context: NodeId,
        expr: &str,
    ) -> Result<Vec<NodeId>, SelectorError>;

    /// Evaluate `expr` as a boolean condition on `context`
    fn test(&self, doc: &Document, context: NodeId, expr: &str) -> Result<bool, SelectorError>;
}

/// Parsed path expression: a union of location paths
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    paths: Vec<LocationPath>,
}

#[derive(Debug, Clone, PartialEq)]
struct LocationPath {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfNode,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "self" => Axis::SelfNode,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    /// Any node, including the document node
    Node,
    /// Any element
    AnyElement,
    AnyInNamespace(String),
    Name {
        namespace: Option<String>,
        local: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Position(usize),
    Condition(Condition),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn holds(self, left: usize, right: usize) -> bool {
        match self {
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
            Comparison::Lt => left < right,
            Comparison::Le => left <= right,
            Comparison::Gt => left > right,
            Comparison::Ge => left >= right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct AttributeName {
    namespace: Option<String>,
    local: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Or(Box<Condition>, Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Exists(LocationPath),
    ValueEquals(LocationPath, String),
    ValueDiffers(LocationPath, String),
    Count(LocationPath, Comparison, usize),
    HasAttribute(AttributeName),
    AttributeEquals(AttributeName, String),
    AttributeDiffers(AttributeName, String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    Pipe,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Dot,
    DotDot,
    Star,
    Colon,
    Axis(String),
    Name(String),
    Literal(String),
    Number(usize),
    Op(Comparison),
}

#[derive(Debug, Clone)]
struct Lexeme {
    token: Token,
    offset: usize,
}

fn syntax(expr: &str, offset: usize, reason: impl Into<String>) -> SelectorError {
    SelectorError::Syntax {
        expr: expr.to_string(),
        offset,
        reason: reason.into(),
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn tokenize(expr: &str) -> Result<Vec<Lexeme>, SelectorError> {
    let chars: Vec<(usize, char)> = expr.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, c)| c);
        let mut push = |token: Token, width: usize| {
            tokens.push(Lexeme { token, offset });
            width
        };

        let consumed = match c {
            c if c.is_whitespace() => 1,
            '/' if next == Some('/') => push(Token::DoubleSlash, 2),
            '/' => push(Token::Slash, 1),
            '|' => push(Token::Pipe, 1),
            '[' => push(Token::LBracket, 1),
            ']' => push(Token::RBracket, 1),
            '(' => push(Token::LParen, 1),
            ')' => push(Token::RParen, 1),
            '@' => push(Token::At, 1),
            '*' => push(Token::Star, 1),
            '.' if next == Some('.') => push(Token::DotDot, 2),
            '.' => push(Token::Dot, 1),
            ':' => push(Token::Colon, 1),
            '=' => push(Token::Op(Comparison::Eq), 1),
            '!' if next == Some('=') => push(Token::Op(Comparison::Ne), 2),
            '<' if next == Some('=') => push(Token::Op(Comparison::Le), 2),
            '<' => push(Token::Op(Comparison::Lt), 1),
            '>' if next == Some('=') => push(Token::Op(Comparison::Ge), 2),
            '>' => push(Token::Op(Comparison::Gt), 1),
            '\'' | '"' => {
                let quote = c;
                let end = chars[i + 1..]
                    .iter()
                    .position(|&(_, ch)| ch == quote)
                    .ok_or_else(|| syntax(expr, offset, "unterminated string literal"))?;
                let value: String = chars[i + 1..i + 1 + end].iter().map(|&(_, ch)| ch).collect();
                push(Token::Literal(value), end + 2)
            }
            c if c.is_ascii_digit() => {
                let len = chars[i..]
                    .iter()
                    .take_while(|&&(_, ch)| ch.is_ascii_digit())
                    .count();
                let digits: String = chars[i..i + len].iter().map(|&(_, ch)| ch).collect();
                let value = digits
                    .parse()
                    .map_err(|_| syntax(expr, offset, "number out of range"))?;
                push(Token::Number(value), len)
            }
            c if is_name_start(c) => {
                let len = chars[i..]
                    .iter()
                    .take_while(|&&(_, ch)| is_name_char(ch))
                    .count();
                let name: String = chars[i..i + len].iter().map(|&(_, ch)| ch).collect();
                let is_axis = chars.get(i + len).map(|&(_, ch)| ch) == Some(':')
                    && chars.get(i + len + 1).map(|&(_, ch)| ch) == Some(':');
                if is_axis {
                    push(Token::Axis(name), len + 2)
                } else {
                    push(Token::Name(name), len)
                }
            }
            other => return Err(syntax(expr, offset, format!("unexpected character '{}'", other))),
        };
        i += consumed;
    }

    Ok(tokens)
}

struct Parser<'e> {
    expr: &'e str,
    namespaces: &'e Namespaces,
    tokens: Vec<Lexeme>,
    pos: usize,
}

impl<'e> Parser<'e> {
    fn new(expr: &'e str, namespaces: &'e Namespaces) -> Result<Self, SelectorError> {
        Ok(Self {
            expr,
            namespaces,
            tokens: tokenize(expr)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|l| &l.token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|l| &l.token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|l| l.offset)
            .unwrap_or(self.expr.len())
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|l| l.token.clone());
        self.pos += 1;
        token
    }

    fn error(&self, reason: impl Into<String>) -> SelectorError {
        syntax(self.expr, self.offset(), reason)
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), SelectorError> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn finish(&self) -> Result<(), SelectorError> {
        if self.pos < self.tokens.len() {
            Err(self.error("unexpected trailing input"))
        } else {
            Ok(())
        }
    }

    fn namespace_for(&self, prefix: &str) -> Result<String, SelectorError> {
        self.namespaces
            .resolve(prefix)
            .map(str::to_string)
            .ok_or_else(|| SelectorError::UnboundPrefix {
                expr: self.expr.to_string(),
                prefix: prefix.to_string(),
            })
    }

    fn parse_union(&mut self) -> Result<PathExpr, SelectorError> {
        let mut paths = vec![self.parse_path()?];
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            paths.push(self.parse_path()?);
        }
        Ok(PathExpr { paths })
    }

    fn parse_path(&mut self) -> Result<LocationPath, SelectorError> {
        let mut steps = Vec::new();
        let absolute = match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if !self.starts_step() {
                    return Err(SelectorError::NotApplicable {
                        expr: self.expr.to_string(),
                        reason: "the document node itself cannot be selected".to_string(),
                    });
                }
                true
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                steps.push(descendant_or_self());
                true
            }
            _ => false,
        };

        steps.push(self.parse_step()?);
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                    steps.push(self.parse_step()?);
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(descendant_or_self());
                    steps.push(self.parse_step()?);
                }
                _ => break,
            }
        }

        Ok(LocationPath { absolute, steps })
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DotDot | Token::Star | Token::Axis(_) | Token::Name(_))
        )
    }

    fn parse_step(&mut self) -> Result<Step, SelectorError> {
        let (axis, test) = match self.peek() {
            Some(Token::Dot) => {
                self.pos += 1;
                (Axis::SelfNode, NodeTest::Node)
            }
            Some(Token::DotDot) => {
                self.pos += 1;
                (Axis::Parent, NodeTest::Node)
            }
            Some(Token::At) => {
                return Err(SelectorError::NotApplicable {
                    expr: self.expr.to_string(),
                    reason: "attribute steps select no elements".to_string(),
                });
            }
            Some(Token::Axis(name)) => {
                let axis = Axis::from_name(name)
                    .ok_or_else(|| self.error(format!("unsupported axis '{}'", name)))?;
                self.pos += 1;
                (axis, self.parse_node_test()?)
            }
            _ => (Axis::Child, self.parse_node_test()?),
        };

        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.pos += 1;
            let predicate = match (self.peek(), self.peek_at(1)) {
                (Some(Token::Number(n)), Some(Token::RBracket)) => {
                    let n = *n;
                    self.pos += 1;
                    if n == 0 {
                        return Err(self.error("positions start at 1"));
                    }
                    Predicate::Position(n)
                }
                _ => Predicate::Condition(self.parse_or()?),
            };
            self.expect(Token::RBracket, "']'")?;
            predicates.push(predicate);
        }

        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, SelectorError> {
        match self.advance() {
            Some(Token::Star) => Ok(NodeTest::AnyElement),
            Some(Token::Name(name)) => {
                if self.peek() != Some(&Token::Colon) {
                    return Ok(NodeTest::Name {
                        namespace: None,
                        local: name,
                    });
                }
                self.pos += 1;
                let namespace = self.namespace_for(&name)?;
                match self.advance() {
                    Some(Token::Star) => Ok(NodeTest::AnyInNamespace(namespace)),
                    Some(Token::Name(local)) => Ok(NodeTest::Name {
                        namespace: Some(namespace),
                        local,
                    }),
                    _ => {
                        self.pos -= 1;
                        Err(self.error("expected a local name after ':'"))
                    }
                }
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error("expected a node test"))
            }
        }
    }

    fn parse_attribute_name(&mut self) -> Result<AttributeName, SelectorError> {
        let Some(Token::Name(first)) = self.advance() else {
            self.pos -= 1;
            return Err(self.error("expected an attribute name"));
        };
        if self.peek() == Some(&Token::Colon) {
            self.pos += 1;
            let namespace = self.namespace_for(&first)?;
            let Some(Token::Name(local)) = self.advance() else {
                self.pos -= 1;
                return Err(self.error("expected a local name after ':'"));
            };
            Ok(AttributeName {
                namespace: Some(namespace),
                local,
            })
        } else {
            Ok(AttributeName {
                namespace: None,
                local: first,
            })
        }
    }

    fn parse_or(&mut self) -> Result<Condition, SelectorError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Name(n)) if n == "or") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Condition, SelectorError> {
        let mut left = self.parse_unary()?;
        while matches!(self.peek(), Some(Token::Name(n)) if n == "and") {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_literal(&mut self) -> Result<String, SelectorError> {
        match self.advance() {
            Some(Token::Literal(value)) => Ok(value),
            Some(Token::Number(n)) => Ok(n.to_string()),
            _ => {
                self.pos -= 1;
                Err(self.error("expected a literal"))
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Condition, SelectorError> {
        let is_call = |p: &Self, name: &str| {
            matches!(p.peek(), Some(Token::Name(n)) if n == name)
                && p.peek_at(1) == Some(&Token::LParen)
        };

        if is_call(self, "not") {
            self.pos += 2;
            let inner = self.parse_or()?;
            self.expect(Token::RParen, "')'")?;
            return Ok(Condition::Not(Box::new(inner)));
        }

        if is_call(self, "count") {
            self.pos += 2;
            let path = self.parse_path()?;
            self.expect(Token::RParen, "')'")?;
            let Some(Token::Op(op)) = self.advance() else {
                self.pos -= 1;
                return Err(self.error("expected a comparison after count()"));
            };
            let Some(Token::Number(n)) = self.advance() else {
                self.pos -= 1;
                return Err(self.error("expected a number"));
            };
            return Ok(Condition::Count(path, op, n));
        }

        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            self.expect(Token::RParen, "')'")?;
            return Ok(inner);
        }

        if self.peek() == Some(&Token::At) {
            self.pos += 1;
            let name = self.parse_attribute_name()?;
            return match self.peek() {
                Some(Token::Op(Comparison::Eq)) => {
                    self.pos += 1;
                    Ok(Condition::AttributeEquals(name, self.parse_literal()?))
                }
                Some(Token::Op(Comparison::Ne)) => {
                    self.pos += 1;
                    Ok(Condition::AttributeDiffers(name, self.parse_literal()?))
                }
                _ => Ok(Condition::HasAttribute(name)),
            };
        }

        let path = self.parse_path()?;
        match self.peek() {
            Some(Token::Op(Comparison::Eq)) => {
                self.pos += 1;
                Ok(Condition::ValueEquals(path, self.parse_literal()?))
            }
            Some(Token::Op(Comparison::Ne)) => {
                self.pos += 1;
                Ok(Condition::ValueDiffers(path, self.parse_literal()?))
            }
            _ => Ok(Condition::Exists(path)),
        }
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}

impl PathExpr {
    /// Parse an expression, resolving prefixes against `namespaces`
    pub fn parse(expr: &str, namespaces: &Namespaces) -> Result<Self, SelectorError> {
        let mut parser = Parser::new(expr, namespaces)?;
        if parser.tokens.is_empty() {
            return Err(syntax(expr, 0, "empty expression"));
        }
        let parsed = parser.parse_union()?;
        parser.finish()?;
        Ok(parsed)
    }
}

/// Parsed boolean condition, evaluated against a single context node
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionExpr {
    condition: Condition,
}

impl ConditionExpr {
    pub fn parse(expr: &str, namespaces: &Namespaces) -> Result<Self, SelectorError> {
        let mut parser = Parser::new(expr, namespaces)?;
        if parser.tokens.is_empty() {
            return Err(syntax(expr, 0, "empty expression"));
        }
        let condition = parser.parse_or()?;
        parser.finish()?;
        Ok(Self { condition })
    }
}

/// A position during evaluation: the document node (`None`) or an element
type Context = Option<NodeId>;

/// Interprets [`PathExpr`] values over a [`Document`]
#[derive(Debug, Clone)]
pub struct PathInterpreter {
    namespaces: Namespaces,
}

impl PathInterpreter {
    pub fn new(namespaces: Namespaces) -> Self {
        Self { namespaces }
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    /// Evaluate an already parsed expression
    pub fn evaluate(&self, doc: &Document, context: NodeId, expr: &PathExpr) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = expr
            .paths
            .iter()
            .flat_map(|path| eval_path(doc, Some(context), path))
            .flatten()
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn evaluate_condition(&self, doc: &Document, context: NodeId, expr: &ConditionExpr) -> bool {
        eval_condition(doc, Some(context), &expr.condition)
    }

    fn check_context(doc: &Document, context: NodeId, expr: &str) -> Result<(), SelectorError> {
        if context.index() >= doc.len() {
            return Err(SelectorError::NotApplicable {
                expr: expr.to_string(),
                reason: "context node is not part of the document".to_string(),
            });
        }
        Ok(())
    }
}

impl Selector for PathInterpreter {
    fn select(
        &self,
        doc: &Document,
        context: NodeId,
        expr: &str,
    ) -> Result<Vec<NodeId>, SelectorError> {
        Self::check_context(doc, context, expr)?;
        let parsed = PathExpr::parse(expr, &self.namespaces)?;
        Ok(self.evaluate(doc, context, &parsed))
    }

    fn test(&self, doc: &Document, context: NodeId, expr: &str) -> Result<bool, SelectorError> {
        Self::check_context(doc, context, expr)?;
        let parsed = ConditionExpr::parse(expr, &self.namespaces)?;
        Ok(self.evaluate_condition(doc, context, &parsed))
    }
}

fn eval_path(doc: &Document, context: Context, path: &LocationPath) -> Vec<Context> {
    let mut current = if path.absolute {
        vec![None]
    } else {
        vec![context]
    };

    for step in &path.steps {
        let mut next = Vec::new();
        for &ctx in &current {
            let mut candidates: Vec<Context> = axis_nodes(doc, ctx, step.axis)
                .into_iter()
                .filter(|c| matches_test(doc, *c, &step.test))
                .collect();
            for predicate in &step.predicates {
                candidates = match predicate {
                    Predicate::Position(n) => candidates.get(n - 1).copied().into_iter().collect(),
                    Predicate::Condition(cond) => candidates
                        .into_iter()
                        .filter(|c| eval_condition(doc, *c, cond))
                        .collect(),
                };
            }
            next.extend(candidates);
        }
        next.sort();
        next.dedup();
        current = next;
    }

    current
}

/// Nodes along an axis, in proximity order
fn axis_nodes(doc: &Document, ctx: Context, axis: Axis) -> Vec<Context> {
    match (ctx, axis) {
        (None, Axis::Child) => vec![Some(doc.root().id())],
        (None, Axis::Descendant) => doc.nodes().map(|n| Some(n.id())).collect(),
        (None, Axis::DescendantOrSelf) => std::iter::once(None)
            .chain(doc.nodes().map(|n| Some(n.id())))
            .collect(),
        (None, Axis::SelfNode | Axis::AncestorOrSelf) => vec![None],
        (None, Axis::Parent | Axis::Ancestor) => Vec::new(),
        (Some(id), axis) => {
            let node = doc.node(id);
            match axis {
                Axis::Child => node.children().map(|n| Some(n.id())).collect(),
                Axis::Descendant => node.descendants().map(|n| Some(n.id())).collect(),
                Axis::DescendantOrSelf => std::iter::once(Some(id))
                    .chain(node.descendants().map(|n| Some(n.id())))
                    .collect(),
                Axis::Parent => vec![parent_context(node)],
                Axis::Ancestor => ancestors(node),
                Axis::AncestorOrSelf => {
                    let mut out = vec![Some(id)];
                    out.extend(ancestors(node));
                    out
                }
                Axis::SelfNode => vec![Some(id)],
            }
        }
    }
}

fn parent_context(node: Node<'_>) -> Context {
    node.parent().map(|p| p.id())
}

fn ancestors(node: Node<'_>) -> Vec<Context> {
    let mut out: Vec<Context> = node.ancestors().map(|a| Some(a.id())).collect();
    out.push(None);
    out
}

fn matches_test(doc: &Document, ctx: Context, test: &NodeTest) -> bool {
    let Some(id) = ctx else {
        return matches!(test, NodeTest::Node);
    };
    let name = doc.node(id).name();
    match test {
        NodeTest::Node | NodeTest::AnyElement => true,
        NodeTest::AnyInNamespace(ns) => name.namespace.as_deref() == Some(ns.as_str()),
        NodeTest::Name { namespace, local } => {
            name.local == *local && name.namespace == *namespace
        }
    }
}

fn attribute_value<'d>(doc: &'d Document, ctx: Context, attr: &AttributeName) -> Option<&'d str> {
    let id = ctx?;
    doc.node(id)
        .attributes()
        .iter()
        .find(|a| a.name.local == attr.local && a.name.namespace == attr.namespace)
        .map(|a| a.value.as_str())
}

fn string_value(doc: &Document, ctx: Context) -> String {
    match ctx {
        Some(id) => doc.node(id).deep_text().trim().to_string(),
        None => doc.root().deep_text().trim().to_string(),
    }
}

fn eval_condition(doc: &Document, ctx: Context, cond: &Condition) -> bool {
    match cond {
        Condition::Or(a, b) => eval_condition(doc, ctx, a) || eval_condition(doc, ctx, b),
        Condition::And(a, b) => eval_condition(doc, ctx, a) && eval_condition(doc, ctx, b),
        Condition::Not(inner) => !eval_condition(doc, ctx, inner),
        Condition::Exists(path) => !eval_path(doc, ctx, path).is_empty(),
        Condition::ValueEquals(path, literal) => eval_path(doc, ctx, path)
            .into_iter()
            .any(|c| string_value(doc, c) == *literal),
        Condition::ValueDiffers(path, literal) => eval_path(doc, ctx, path)
            .into_iter()
            .any(|c| string_value(doc, c) != *literal),
        Condition::Count(path, op, n) => op.holds(eval_path(doc, ctx, path).len(), *n),
        Condition::HasAttribute(attr) => attribute_value(doc, ctx, attr).is_some(),
        Condition::AttributeEquals(attr, literal) => {
            attribute_value(doc, ctx, attr) == Some(literal.as_str())
        }
        Condition::AttributeDiffers(attr, literal) => {
            attribute_value(doc, ctx, attr).is_some_and(|v| v != literal)
        }
    }
}
