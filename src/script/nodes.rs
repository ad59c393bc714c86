//! Document tree produced by the parser.
//!
//! Every node implements [`fmt::Display`] by writing back template source
//! that parses to an equal tree.

use std::fmt;

use crate::script::functions::Function;
use crate::script::lexer::{Operator, CLOSE_TAG, OPEN_TAG};

/// Root of a parsed template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    children: Vec<Node>,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(TextNode),
    ForLoop(ForLoopNode),
    Echo(EchoNode),
}

/// Literal text, stored with escapes collapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    text: String,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// `{$ FOR var start end [step] $} ... {$ END $}`
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoopNode {
    variable: String,
    start: Operand,
    end: Operand,
    step: Option<Operand>,
    children: Vec<Node>,
}

impl ForLoopNode {
    pub fn new(
        variable: impl Into<String>,
        start: Operand,
        end: Operand,
        step: Option<Operand>,
        children: Vec<Node>,
    ) -> Self {
        Self {
            variable: variable.into(),
            start,
            end,
            step,
            children,
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn start(&self) -> &Operand {
        &self.start
    }

    pub fn end(&self) -> &Operand {
        &self.end
    }

    /// Absent steps default to integer `1` at run time.
    pub fn step(&self) -> Option<&Operand> {
        self.step.as_ref()
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }
}

/// `{$= element... $}`
#[derive(Debug, Clone, PartialEq)]
pub struct EchoNode {
    elements: Vec<Element>,
}

impl EchoNode {
    pub fn new(elements: Vec<Element>) -> Self {
        Self { elements }
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }
}

/// A value that can appear as a loop bound or be pushed by an echo.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Variable(String),
    Integer(i64),
    Double(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Operand(Operand),
    Operator(Operator),
    Function(Function),
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.children.iter().try_for_each(|child| child.fmt(f))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(node) => node.fmt(f),
            Node::ForLoop(node) => node.fmt(f),
            Node::Echo(node) => node.fmt(f),
        }
    }
}

impl fmt::Display for TextNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let escaped = self
            .text
            .replace('\\', "\\\\")
            .replace(OPEN_TAG, "\\{$");
        f.write_str(&escaped)
    }
}

impl fmt::Display for ForLoopNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{OPEN_TAG} FOR {} {} {}", self.variable, self.start, self.end)?;
        if let Some(step) = &self.step {
            write!(f, " {step}")?;
        }
        write!(f, " {CLOSE_TAG}")?;
        self.children.iter().try_for_each(|child| child.fmt(f))?;
        write!(f, "{OPEN_TAG}END{CLOSE_TAG}")
    }
}

impl fmt::Display for EchoNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{OPEN_TAG}=")?;
        for element in &self.elements {
            write!(f, " {element}")?;
        }
        write!(f, " {CLOSE_TAG}")
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Variable(name) => f.write_str(name),
            Operand::Integer(value) => write!(f, "{value}"),
            Operand::Double(value) => f.write_str(&format_double(*value)),
            Operand::Str(value) => {
                f.write_str("\"")?;
                for c in value.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\r' => f.write_str("\\r")?,
                        '\t' => f.write_str("\\t")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Operand(operand) => operand.fmt(f),
            Element::Operator(op) => op.fmt(f),
            Element::Function(function) => write!(f, "@{}", function.name()),
        }
    }
}

/// Render a double so that it always reads back as a double.
pub(crate) fn format_double(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}
