//! XPath 1.0 subset: tokenizer, syntax tree and recursive descent parser.

use super::TransformError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Literal(String),
    Number(f64),
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    ColonColon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Pipe,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Star,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '.' if next == Some('.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => {
                let (number, end) = scan_number(&chars, i);
                tokens.push(Token::Number(number));
                i = end;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            ':' if next == Some(':') => {
                tokens.push(Token::ColonColon);
                i += 2;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::LtEq);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::GtEq);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or("unterminated string literal")?;
                tokens.push(Token::Literal(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() => {
                let (number, end) = scan_number(&chars, i);
                tokens.push(Token::Number(number));
                i = end;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() {
                    let c = chars[i];
                    let is_axis_separator = c == ':' && chars.get(i + 1) == Some(&':');
                    if is_axis_separator
                        || !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
                    {
                        break;
                    }
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

fn scan_number(chars: &[char], start: usize) -> (f64, usize) {
    let mut end = start;
    while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
        end += 1;
    }
    let text: String = chars[start..end].iter().collect();
    (text.parse().unwrap_or(f64::NAN), end)
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(String),
    Number(f64),
    Path(LocationPath),
    Union(Vec<Expr>),
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
    Call(Function, Vec<Expr>),
}

impl Expr {
    /// The position a `[n]` predicate selects, when this is a whole number.
    pub fn literal_position(&self) -> Option<usize> {
        match *self {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Self::Number(n) if n >= 1.0 && n.fract() == 0.0 => Some(n as usize),
            _ => None,
        }
    }

    /// Whether a predicate gives the same answer whatever the context
    /// position and size.
    ///
    /// Numeric predicates compare against the position, so they never are.
    pub fn is_position_free(&self) -> bool {
        let numeric = matches!(
            self,
            Self::Number(_)
                | Self::Call(
                    Function::Count
                        | Function::Number
                        | Function::StringLength
                        | Function::Position
                        | Function::Last,
                    _
                )
        );
        !numeric && !self.reads_position()
    }

    fn reads_position(&self) -> bool {
        match self {
            Self::Literal(_) | Self::Number(_) | Self::Path(_) => false,
            Self::Call(Function::Position | Function::Last, _) => true,
            Self::Call(_, args) | Self::Union(args) => args.iter().any(Self::reads_position),
            Self::Or(left, right) | Self::And(left, right) | Self::Compare(left, _, right) => {
                left.reads_position() || right.reads_position()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    const fn descendant_or_self() -> Self {
        Self {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }

    /// Whether this is the step `//` expands to.
    pub fn is_descendant_shortcut(&self) -> bool {
        self.axis == Axis::DescendantOrSelf
            && self.test == NodeTest::Node
            && self.predicates.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Attribute,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    Descendant,
    DescendantOrSelf,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Self::Child,
            "attribute" => Self::Attribute,
            "self" => Self::SelfAxis,
            "parent" => Self::Parent,
            "ancestor" => Self::Ancestor,
            "ancestor-or-self" => Self::AncestorOrSelf,
            "descendant" => Self::Descendant,
            "descendant-or-self" => Self::DescendantOrSelf,
            "following-sibling" => Self::FollowingSibling,
            "preceding-sibling" => Self::PrecedingSibling,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `node()`
    Node,
    /// `*`
    Wildcard,
    /// A qualified name.
    Name(String),
    /// `text()`
    Text,
    /// `comment()`
    Comment,
    /// `processing-instruction()`
    ProcessingInstruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Name,
    LocalName,
    String,
    Concat,
    NormalizeSpace,
    Contains,
    StartsWith,
    SubstringBefore,
    SubstringAfter,
    Translate,
    StringLength,
    Count,
    Position,
    Last,
    Not,
    True,
    False,
    Boolean,
    Number,
}

impl Function {
    fn lookup(name: &str) -> Option<(Self, usize, Option<usize>)> {
        use Function as F;
        Some(match name {
            "name" => (F::Name, 0, Some(1)),
            "local-name" => (F::LocalName, 0, Some(1)),
            "string" => (F::String, 0, Some(1)),
            "concat" => (F::Concat, 2, None),
            "normalize-space" => (F::NormalizeSpace, 0, Some(1)),
            "contains" => (F::Contains, 2, Some(2)),
            "starts-with" => (F::StartsWith, 2, Some(2)),
            "substring-before" => (F::SubstringBefore, 2, Some(2)),
            "substring-after" => (F::SubstringAfter, 2, Some(2)),
            "translate" => (F::Translate, 3, Some(3)),
            "string-length" => (F::StringLength, 0, Some(1)),
            "count" => (F::Count, 1, Some(1)),
            "position" => (F::Position, 0, Some(0)),
            "last" => (F::Last, 0, Some(0)),
            "not" => (F::Not, 1, Some(1)),
            "true" => (F::True, 0, Some(0)),
            "false" => (F::False, 0, Some(0)),
            "boolean" => (F::Boolean, 1, Some(1)),
            "number" => (F::Number, 0, Some(1)),
            _ => return None,
        })
    }
}

const NODE_TYPES: [&str; 4] = ["node", "text", "comment", "processing-instruction"];

/// Parses a complete expression.
pub fn parse_expr(source: &str) -> Result<Expr, TransformError> {
    let mut parser = Parser::new(source)?;
    let expr = parser.or_expr()?;
    parser.finish()?;
    Ok(expr)
}

/// Parses a `|`-separated list of location paths, as used by match
/// patterns.
pub fn parse_pattern_paths(source: &str) -> Result<Vec<LocationPath>, TransformError> {
    let mut parser = Parser::new(source)?;
    let mut paths = vec![parser.location_path()?];
    while parser.eat(&Token::Pipe) {
        paths.push(parser.location_path()?);
    }
    parser.finish()?;
    Ok(paths)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self, TransformError> {
        let tokens = tokenize(source).map_err(|message| syntax(source, message))?;
        Ok(Self {
            source,
            tokens,
            pos: 0,
        })
    }

    fn error(&self, message: impl Into<String>) -> TransformError {
        syntax(self.source, message)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), TransformError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {token:?}, found {:?}", self.peek())))
        }
    }

    fn finish(&self) -> Result<(), TransformError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!("unexpected trailing {token:?}"))),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, TransformError> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, TransformError> {
        let mut left = self.equality_expr()?;
        while self.eat_keyword("and") {
            let right = self.equality_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality_expr(&mut self) -> Result<Expr, TransformError> {
        let mut left = self.relational_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CompareOp::Eq,
                Some(Token::NotEq) => CompareOp::NotEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.relational_expr()?;
            left = Expr::Compare(Box::new(left), op, Box::new(right));
        }
    }

    fn relational_expr(&mut self) -> Result<Expr, TransformError> {
        let mut left = self.union_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::LtEq) => CompareOp::LtEq,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::GtEq) => CompareOp::GtEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.union_expr()?;
            left = Expr::Compare(Box::new(left), op, Box::new(right));
        }
    }

    fn union_expr(&mut self) -> Result<Expr, TransformError> {
        let first = self.primary_expr()?;
        if self.peek() != Some(&Token::Pipe) {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat(&Token::Pipe) {
            members.push(self.primary_expr()?);
        }
        Ok(Expr::Union(members))
    }

    fn primary_expr(&mut self) -> Result<Expr, TransformError> {
        match self.peek() {
            Some(Token::Literal(_)) => match self.advance() {
                Some(Token::Literal(text)) => Ok(Expr::Literal(text)),
                _ => Err(self.error("expected literal")),
            },
            Some(Token::Number(_)) => match self.advance() {
                Some(Token::Number(n)) => Ok(Expr::Number(n)),
                _ => Err(self.error("expected number")),
            },
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name))
                if self.peek_at(1) == Some(&Token::LParen)
                    && !NODE_TYPES.contains(&name.as_str()) =>
            {
                self.function_call()
            }
            _ => Ok(Expr::Path(self.location_path()?)),
        }
    }

    fn function_call(&mut self) -> Result<Expr, TransformError> {
        let Some(Token::Name(name)) = self.advance() else {
            return Err(self.error("expected function name"));
        };
        let (function, min, max) =
            Function::lookup(&name).ok_or_else(|| self.error(format!("unknown function {name}()")))?;
        self.expect(&Token::LParen)?;

        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.or_expr()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma)?;
            }
        }

        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            return Err(self.error(format!(
                "{name}() does not take {} argument(s)",
                args.len()
            )));
        }
        Ok(Expr::Call(function, args))
    }

    fn location_path(&mut self) -> Result<LocationPath, TransformError> {
        let mut steps = Vec::new();
        let absolute = match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if !self.starts_step() {
                    return Ok(LocationPath {
                        absolute: true,
                        steps,
                    });
                }
                true
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                steps.push(Step::descendant_or_self());
                true
            }
            _ => false,
        };

        steps.push(self.step()?);
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
                steps.push(self.step()?);
            } else {
                return Ok(LocationPath { absolute, steps });
            }
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name(_) | Token::Star | Token::At | Token::Dot | Token::DotDot)
        )
    }

    fn step(&mut self) -> Result<Step, TransformError> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::ColonColon)) =
            (self.peek(), self.peek_at(1))
        {
            let axis = Axis::from_name(name)
                .ok_or_else(|| self.error(format!("unsupported axis {name}")))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = self.node_test()?;
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.or_expr()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn node_test(&mut self) -> Result<NodeTest, TransformError> {
        match self.advance() {
            Some(Token::Star) => Ok(NodeTest::Wildcard),
            Some(Token::Name(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(NodeTest::Name(name));
                }
                let test = match name.as_str() {
                    "node" => NodeTest::Node,
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    "processing-instruction" => NodeTest::ProcessingInstruction,
                    _ => return Err(self.error(format!("unknown node test {name}()"))),
                };
                self.expect(&Token::LParen)?;
                self.expect(&Token::RParen)?;
                Ok(test)
            }
            other => Err(self.error(format!("expected a node test, found {other:?}"))),
        }
    }
}

fn syntax(source: &str, message: impl Into<String>) -> TransformError {
    TransformError::Syntax {
        expression: source.to_string(),
        message: message.into(),
    }
}

/// One part of an attribute value template.
#[derive(Debug, Clone, PartialEq)]
pub enum AvtPart {
    Literal(String),
    Expr(Expr),
}

/// An attribute value with embedded `{expression}` parts.
#[derive(Debug, Clone, PartialEq)]
pub struct Avt(pub Vec<AvtPart>);

impl Avt {
    pub fn parse(source: &str) -> Result<Self, TransformError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(syntax(source, "unmatched '}' in attribute value template")),
                '{' => {
                    let mut expression = String::new();
                    let mut quote = None;
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match (quote, c) {
                            (None, '}') => {
                                closed = true;
                                break;
                            }
                            (None, '\'' | '"') => quote = Some(c),
                            (Some(q), c) if q == c => quote = None,
                            _ => {}
                        }
                        expression.push(c);
                    }
                    if !closed {
                        return Err(syntax(source, "unterminated '{' in attribute value template"));
                    }
                    if !literal.is_empty() {
                        parts.push(AvtPart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(AvtPart::Expr(parse_expr(&expression)?));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(AvtPart::Literal(literal));
        }
        Ok(Self(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(name: &str) -> Step {
        Step {
            axis: Axis::Child,
            test: NodeTest::Name(name.to_string()),
            predicates: Vec::new(),
        }
    }

    #[test]
    fn parses_relative_paths() {
        let expr = parse_expr("usx/para").unwrap();
        assert_eq!(
            expr,
            Expr::Path(LocationPath {
                absolute: false,
                steps: vec![child("usx"), child("para")],
            })
        );
    }

    #[test]
    fn parses_predicates_and_attributes() {
        let Expr::Path(path) = parse_expr("para[@style='s1']").unwrap() else {
            panic!("expected a path");
        };
        assert_eq!(path.steps.len(), 1);
        assert_eq!(
            path.steps[0].predicates[0],
            Expr::Compare(
                Box::new(Expr::Path(LocationPath {
                    absolute: false,
                    steps: vec![Step {
                        axis: Axis::Attribute,
                        test: NodeTest::Name("style".to_string()),
                        predicates: Vec::new(),
                    }],
                })),
                CompareOp::Eq,
                Box::new(Expr::Literal("s1".to_string())),
            )
        );
    }

    #[test]
    fn double_slash_expands_to_descendant_or_self() {
        let Expr::Path(path) = parse_expr("//verse").unwrap() else {
            panic!("expected a path");
        };
        assert!(path.absolute);
        assert!(path.steps[0].is_descendant_shortcut());
        assert_eq!(path.steps[1], child("verse"));
    }

    #[test]
    fn keywords_are_operators_after_operands() {
        let expr = parse_expr("@a = 'x' or @b and not(@c)").unwrap();
        assert!(matches!(expr, Expr::Or(_, _)));
    }

    #[test]
    fn node_type_tests_are_not_functions() {
        let Expr::Path(path) = parse_expr("text()").unwrap() else {
            panic!("expected a path");
        };
        assert_eq!(path.steps[0].test, NodeTest::Text);
    }

    #[test]
    fn names_may_contain_dots_and_hyphens() {
        let Expr::Path(path) = parse_expr("following-sibling::osis.x-y").unwrap() else {
            panic!("expected a path");
        };
        assert_eq!(path.steps[0].axis, Axis::FollowingSibling);
        assert_eq!(path.steps[0].test, NodeTest::Name("osis.x-y".to_string()));
    }

    #[test]
    fn rejects_unknown_functions_and_bad_arity() {
        assert!(parse_expr("document('x')").is_err());
        assert!(parse_expr("concat('a')").is_err());
        assert!(parse_expr("not()").is_err());
    }

    #[test]
    fn rejects_trailing_tokens() {
        assert!(parse_expr("@a @b").is_err());
        assert!(parse_expr("'unterminated").is_err());
    }

    #[test]
    fn parses_attribute_value_templates() {
        let avt = Avt::parse("{@code}.{@number} {{x}}").unwrap();
        assert_eq!(avt.0.len(), 4);
        assert_eq!(avt.0[1], AvtPart::Literal(".".to_string()));
        assert_eq!(avt.0[3], AvtPart::Literal(" {x}".to_string()));
    }

    #[test]
    fn avt_braces_inside_literals_do_not_close() {
        let avt = Avt::parse("{concat('}', @a)}").unwrap();
        assert_eq!(avt.0.len(), 1);
        assert!(Avt::parse("{@a").is_err());
        assert!(Avt::parse("a}").is_err());
    }

    #[test]
    fn pattern_alternatives() {
        let paths = parse_pattern_paths("/ | verse | @style").unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths[0].absolute && paths[0].steps.is_empty());
    }

    #[test]
    fn positional_predicates_are_recognised() {
        let position = |e: &str| parse_expr(e).unwrap().literal_position();
        assert_eq!(position("1"), Some(1));
        assert_eq!(position("3"), Some(3));
        assert_eq!(position("1.5"), None);
        assert_eq!(position("0"), None);
        assert_eq!(position("@n"), None);

        let free = |e: &str| parse_expr(e).unwrap().is_position_free();
        assert!(free("@style='s1'"));
        assert!(free("verse[2]"));
        assert!(free("starts-with(@style, 'mt') or @eid"));
        assert!(!free("2"));
        assert!(!free("last()"));
        assert!(!free("position() > 1"));
        assert!(!free("count(verse)"));
    }
}
