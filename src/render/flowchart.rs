// ABOUTME: Parser for the flowchart subset of the Mermaid diagram language
// ABOUTME: Produces a node/edge graph or a syntax error carrying the offending line

use std::collections::HashMap;

use crate::error::RenderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    TopDown,
    BottomUp,
    LeftRight,
    RightLeft,
}

impl Direction {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "TD" | "TB" => Some(Direction::TopDown),
            "BT" => Some(Direction::BottomUp),
            "LR" => Some(Direction::LeftRight),
            "RL" => Some(Direction::RightLeft),
            _ => None,
        }
    }

    pub fn is_horizontal(&self) -> bool {
        matches!(self, Direction::LeftRight | Direction::RightLeft)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeShape {
    Rect,
    Round,
    Stadium,
    Subroutine,
    Cylinder,
    Circle,
    DoubleCircle,
    Asymmetric,
    Rhombus,
    Hexagon,
    Parallelogram,
    ParallelogramAlt,
    Trapezoid,
    TrapezoidAlt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub shape: NodeShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stroke {
    Solid,
    Dotted,
    Thick,
    Invisible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowHead {
    None,
    Arrow,
    Circle,
    Cross,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub label: Option<String>,
    pub stroke: Stroke,
    pub head: ArrowHead,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flowchart {
    pub direction: Direction,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Flowchart {
    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }
}

/// Statements that carry styling or interaction only.
const IGNORED_KEYWORDS: [&str; 6] = ["classDef", "class", "style", "linkStyle", "click", "direction"];

pub fn parse(source: &str) -> Result<Flowchart, RenderError> {
    let mut builder = Builder::default();
    let mut direction = None;
    let mut subgraph_depth = 0usize;
    let mut last_line = 0;

    for (index, raw_line) in source.lines().enumerate() {
        let line_no = index + 1;
        last_line = line_no;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("%%") {
            continue;
        }

        for statement in split_statements(line) {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }

            if direction.is_none() {
                direction = Some(parse_header(statement, line_no)?);
                continue;
            }

            let keyword = statement.split_whitespace().next().unwrap_or_default();
            match keyword {
                "subgraph" => subgraph_depth += 1,
                "end" => {
                    if subgraph_depth == 0 {
                        return Err(syntax(line_no, "`end` without matching `subgraph`"));
                    }
                    subgraph_depth -= 1;
                }
                k if IGNORED_KEYWORDS.contains(&k) => {}
                _ => parse_statement(statement, line_no, &mut builder)?,
            }
        }
    }

    let Some(direction) = direction else {
        return Err(syntax(last_line.max(1), "empty diagram"));
    };
    if subgraph_depth > 0 {
        return Err(syntax(last_line, "unclosed `subgraph`"));
    }

    Ok(Flowchart {
        direction,
        nodes: builder.nodes,
        edges: builder.edges,
    })
}

fn syntax(line: usize, message: impl Into<String>) -> RenderError {
    RenderError::Syntax {
        line,
        message: message.into(),
    }
}

fn parse_header(statement: &str, line_no: usize) -> Result<Direction, RenderError> {
    let mut words = statement.split_whitespace();
    match words.next() {
        Some("flowchart") | Some("graph") => {}
        Some(other) => {
            return Err(syntax(
                line_no,
                format!("unsupported diagram type `{}`, expected `flowchart` or `graph`", other),
            ))
        }
        None => return Err(syntax(line_no, "empty diagram")),
    }
    match words.next() {
        None => Ok(Direction::TopDown),
        Some(token) => Direction::parse(token)
            .ok_or_else(|| syntax(line_no, format!("unknown direction `{}`", token))),
    }
}

/// Splits on `;` outside labels and quotes.
fn split_statements(line: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '[' | '(' | '{' if !quoted => depth += 1,
            ']' | ')' | '}' if !quoted => depth -= 1,
            ';' if !quoted && depth <= 0 => {
                parts.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&line[start..]);
    parts
}

#[derive(Default)]
struct Builder {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
}

impl Builder {
    fn node(&mut self, id: &str, shape: Option<(NodeShape, String)>) -> usize {
        let idx = match self.index.get(id) {
            Some(&idx) => idx,
            None => {
                self.nodes.push(Node {
                    id: id.to_string(),
                    label: id.to_string(),
                    shape: NodeShape::Rect,
                });
                self.index.insert(id.to_string(), self.nodes.len() - 1);
                self.nodes.len() - 1
            }
        };
        if let Some((shape, label)) = shape {
            self.nodes[idx].shape = shape;
            self.nodes[idx].label = label;
        }
        idx
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn bump(&mut self, n: usize) {
        self.pos += n;
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.rest().starts_with(prefix) {
            self.bump(prefix.len());
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn error(&self, message: impl Into<String>) -> RenderError {
        syntax(self.line, message)
    }

    fn describe_next(&self) -> String {
        match self.peek() {
            Some(c) => format!("`{}`", c),
            None => "end of line".to_string(),
        }
    }
}

fn parse_statement(statement: &str, line: usize, builder: &mut Builder) -> Result<(), RenderError> {
    let mut cur = Cursor {
        src: statement,
        pos: 0,
        line,
    };

    let mut sources = parse_group(&mut cur, builder)?;
    loop {
        cur.skip_ws();
        if cur.at_end() {
            return Ok(());
        }
        let link = parse_link(&mut cur)?;
        cur.skip_ws();
        let targets = parse_group(&mut cur, builder)?;
        for &from in &sources {
            for &to in &targets {
                builder.edges.push(Edge {
                    from,
                    to,
                    label: link.label.clone(),
                    stroke: link.stroke,
                    head: link.head,
                });
            }
        }
        sources = targets;
    }
}

/// `A`, or `A & B & C`.
fn parse_group(cur: &mut Cursor<'_>, builder: &mut Builder) -> Result<Vec<usize>, RenderError> {
    let mut group = vec![parse_node(cur, builder)?];
    loop {
        let save = cur.pos;
        cur.skip_ws();
        if cur.eat("&") {
            cur.skip_ws();
            group.push(parse_node(cur, builder)?);
        } else {
            cur.pos = save;
            return Ok(group);
        }
    }
}

fn is_id_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn parse_node(cur: &mut Cursor<'_>, builder: &mut Builder) -> Result<usize, RenderError> {
    let id_len: usize = cur
        .rest()
        .chars()
        .take_while(|&c| is_id_char(c))
        .map(char::len_utf8)
        .sum();
    if id_len == 0 {
        return Err(cur.error(format!("expected node id, found {}", cur.describe_next())));
    }
    let id = &cur.rest()[..id_len];
    cur.bump(id_len);

    let shape = parse_shape(cur)?;
    // `:::className` attaches a style class; irrelevant for layout.
    if cur.eat(":::") {
        let class_len: usize = cur
            .rest()
            .chars()
            .take_while(|&c| is_id_char(c) || c == '-')
            .map(char::len_utf8)
            .sum();
        cur.bump(class_len);
    }
    Ok(builder.node(id, shape))
}

/// Opening delimiter, candidate closers and the shape each closer selects.
/// Longer openers come first so `((` wins over `(`.
const SHAPES: &[(&str, &[(&str, NodeShape)])] = &[
    ("(((", &[(")))", NodeShape::DoubleCircle)]),
    ("((", &[("))", NodeShape::Circle)]),
    ("([", &[("])", NodeShape::Stadium)]),
    ("(", &[(")", NodeShape::Round)]),
    ("[[", &[("]]", NodeShape::Subroutine)]),
    ("[(", &[(")]", NodeShape::Cylinder)]),
    (
        "[/",
        &[("/]", NodeShape::Parallelogram), ("\\]", NodeShape::Trapezoid)],
    ),
    (
        "[\\",
        &[("\\]", NodeShape::ParallelogramAlt), ("/]", NodeShape::TrapezoidAlt)],
    ),
    ("[", &[("]", NodeShape::Rect)]),
    ("{{", &[("}}", NodeShape::Hexagon)]),
    ("{", &[("}", NodeShape::Rhombus)]),
    (">", &[("]", NodeShape::Asymmetric)]),
];

fn parse_shape(cur: &mut Cursor<'_>) -> Result<Option<(NodeShape, String)>, RenderError> {
    let Some((opener, closers)) = SHAPES.iter().find(|(open, _)| cur.rest().starts_with(open))
    else {
        return Ok(None);
    };
    cur.bump(opener.len());

    if cur.peek() == Some('"') {
        cur.bump(1);
        let Some(end) = cur.rest().find('"') else {
            return Err(cur.error("unterminated quoted label"));
        };
        let label = cur.rest()[..end].to_string();
        cur.bump(end + 1);
        for (closer, shape) in closers.iter() {
            if cur.eat(closer) {
                return Ok(Some((*shape, label)));
            }
        }
        return Err(cur.error(format!(
            "expected `{}` after quoted label, found {}",
            closers[0].0,
            cur.describe_next()
        )));
    }

    let found = closers
        .iter()
        .filter_map(|(closer, shape)| cur.rest().find(closer).map(|at| (at, *closer, *shape)))
        .min_by_key(|(at, _, _)| *at);
    let Some((at, closer, shape)) = found else {
        return Err(cur.error(format!(
            "unterminated node label, expected `{}`",
            closers[0].0
        )));
    };
    let label = cur.rest()[..at].trim().to_string();
    cur.bump(at + closer.len());
    Ok(Some((shape, label)))
}

struct Link {
    label: Option<String>,
    stroke: Stroke,
    head: ArrowHead,
}

fn is_link_char(c: char) -> bool {
    matches!(c, '-' | '=' | '.' | '~')
}

fn stroke_of(body: &str) -> Stroke {
    if body.contains('~') {
        Stroke::Invisible
    } else if body.contains('=') {
        Stroke::Thick
    } else if body.contains('.') {
        Stroke::Dotted
    } else {
        Stroke::Solid
    }
}

fn parse_link(cur: &mut Cursor<'_>) -> Result<Link, RenderError> {
    // Bidirectional `<-->` is drawn like a plain arrow.
    cur.eat("<");

    let body_len: usize = cur.rest().chars().take_while(|&c| is_link_char(c)).count();
    if body_len < 2 {
        return Err(cur.error(format!("expected a link such as `-->`, found {}", cur.describe_next())));
    }
    let body = &cur.rest()[..body_len];
    cur.bump(body_len);

    let mut head = parse_head(cur);
    let stroke = stroke_of(body);
    let mut label = None;

    // `-- text -->`, `== text ==>`, `-. text .->`
    let opens_text = matches!(body, "--" | "==" | "-.") && head == ArrowHead::None;
    if opens_text && cur.peek().map_or(false, char::is_whitespace) {
        let closers: &[&str] = match body {
            "==" => &["==>", "==="],
            "-." => &[".->", ".-"],
            _ => &["-->", "---"],
        };
        let found = closers
            .iter()
            .filter_map(|closer| cur.rest().find(closer).map(|at| (at, *closer)))
            .min_by_key(|(at, _)| *at);
        let Some((at, closer)) = found else {
            return Err(cur.error("unterminated link text"));
        };
        label = Some(cur.rest()[..at].trim().to_string());
        cur.bump(at + closer.len());
        // Closers without a head (`---`) may still be followed by one (`---o`).
        let extra: usize = cur.rest().chars().take_while(|&c| is_link_char(c)).count();
        cur.bump(extra);
        head = if closer.ends_with('>') {
            ArrowHead::Arrow
        } else {
            parse_head(cur)
        };
    }

    cur.skip_ws();
    if cur.eat("|") {
        let Some(end) = cur.rest().find('|') else {
            return Err(cur.error("unterminated `|label|`"));
        };
        let text = cur.rest()[..end].trim().trim_matches('"').to_string();
        cur.bump(end + 1);
        label = Some(text);
    }

    Ok(Link {
        label,
        stroke,
        head,
    })
}

fn parse_head(cur: &mut Cursor<'_>) -> ArrowHead {
    if cur.eat(">") {
        return ArrowHead::Arrow;
    }
    let mut chars = cur.rest().chars();
    let head = match chars.next() {
        Some('o') => ArrowHead::Circle,
        Some('x') => ArrowHead::Cross,
        _ => return ArrowHead::None,
    };
    // Only a head when it stands alone; otherwise it starts the next node id.
    if chars.next().map_or(true, |c| c.is_whitespace()) {
        cur.bump(1);
        head
    } else {
        ArrowHead::None
    }
}
