//! Recursive-descent parser that turns template source into a [`Document`].
//!
//! Open `FOR` tags are kept on an explicit stack of frames; each frame owns
//! the children collected so far and is folded into its parent when the
//! matching `END` arrives.

use crate::script::error::ParseError;
use crate::script::functions::Function;
use crate::script::lexer::{Keyword, Lexer, LexerMode, Token};
use crate::script::nodes::{Document, EchoNode, Element, ForLoopNode, Node, Operand, TextNode};

/// Parse a complete template.
pub fn parse(source: &str) -> Result<Document, ParseError> {
    Parser::new(source).parse()
}

struct OpenLoop {
    variable: String,
    start: Operand,
    end: Operand,
    step: Option<Operand>,
    children: Vec<Node>,
}

impl OpenLoop {
    fn close(self) -> ForLoopNode {
        ForLoopNode::new(self.variable, self.start, self.end, self.step, self.children)
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    root: Vec<Node>,
    open: Vec<OpenLoop>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
            root: Vec::new(),
            open: Vec::new(),
        }
    }

    pub fn parse(mut self) -> Result<Document, ParseError> {
        loop {
            match self.lexer.next_token()? {
                Token::Eof => break,
                Token::Text(text) => self.push(Node::Text(TextNode::new(text))),
                Token::OpenTag => {
                    self.lexer.set_mode(LexerMode::Tag);
                    self.parse_tag()?;
                    self.lexer.set_mode(LexerMode::Text);
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "text or tag",
                        found: other.to_string(),
                    })
                }
            }
        }

        if let Some(unclosed) = self.open.pop() {
            return Err(ParseError::UnclosedLoop {
                variable: unclosed.variable,
            });
        }
        Ok(Document::new(self.root))
    }

    fn push(&mut self, node: Node) {
        match self.open.last_mut() {
            Some(frame) => frame.children.push(node),
            None => self.root.push(node),
        }
    }

    fn parse_tag(&mut self) -> Result<(), ParseError> {
        match self.lexer.next_token()? {
            Token::Keyword(Keyword::Echo) => {
                let echo = self.parse_echo()?;
                self.push(Node::Echo(echo));
            }
            Token::Keyword(Keyword::For) => {
                let header = self.parse_for_header()?;
                self.open.push(header);
            }
            Token::Keyword(Keyword::End) => {
                self.expect_close()?;
                let frame = self.open.pop().ok_or(ParseError::UnmatchedEnd)?;
                self.push(Node::ForLoop(frame.close()));
            }
            other => {
                return Err(ParseError::MissingKeyword {
                    found: other.to_string(),
                })
            }
        }
        Ok(())
    }

    fn expect_close(&mut self) -> Result<(), ParseError> {
        match self.lexer.next_token()? {
            Token::CloseTag => Ok(()),
            other => Err(ParseError::UnexpectedToken {
                expected: "$}",
                found: other.to_string(),
            }),
        }
    }

    fn parse_echo(&mut self) -> Result<EchoNode, ParseError> {
        let mut elements = Vec::new();
        loop {
            let element = match self.lexer.next_token()? {
                Token::CloseTag => break,
                Token::Identifier(name) => Element::Operand(Operand::Variable(name)),
                Token::Integer(value) => Element::Operand(Operand::Integer(value)),
                Token::Double(value) => Element::Operand(Operand::Double(value)),
                Token::Str(value) => Element::Operand(Operand::Str(value)),
                Token::Operator(op) => Element::Operator(op),
                Token::Function(name) => match Function::from_name(&name) {
                    Some(function) => Element::Function(function),
                    None => return Err(ParseError::UnknownFunction { name }),
                },
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "echo element or $}",
                        found: other.to_string(),
                    })
                }
            };
            elements.push(element);
        }
        Ok(EchoNode::new(elements))
    }

    fn parse_for_header(&mut self) -> Result<OpenLoop, ParseError> {
        let variable = match self.lexer.next_token()? {
            Token::Identifier(name) => name,
            other => {
                return Err(ParseError::InvalidLoopVariable {
                    found: other.to_string(),
                })
            }
        };

        let mut bounds = Vec::with_capacity(3);
        loop {
            let bound = match self.lexer.next_token()? {
                Token::CloseTag => break,
                Token::Identifier(name) => Operand::Variable(name),
                Token::Integer(value) => Operand::Integer(value),
                Token::Double(value) => Operand::Double(value),
                Token::Str(value) => Operand::Str(value),
                Token::Eof => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "$}",
                        found: Token::Eof.to_string(),
                    })
                }
                other => {
                    return Err(ParseError::InvalidLoopBound {
                        found: other.to_string(),
                    })
                }
            };
            if bounds.len() == 3 {
                return Err(ParseError::TooManyLoopArguments { variable });
            }
            bounds.push(bound);
        }

        let mut bounds = bounds.into_iter();
        let (Some(start), Some(end)) = (bounds.next(), bounds.next()) else {
            return Err(ParseError::TooFewLoopArguments { variable });
        };
        Ok(OpenLoop {
            variable,
            start,
            end,
            step: bounds.next(),
            children: Vec::new(),
        })
    }
}
