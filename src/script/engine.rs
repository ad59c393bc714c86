//! Tree-walking interpreter for parsed documents.

use std::collections::HashMap;

use tracing::trace;

use crate::script::error::RuntimeError;
use crate::script::lexer::Operator;
use crate::script::nodes::{Document, EchoNode, Element, ForLoopNode, Node, Operand};
use crate::script::value::{Number, Value};
use crate::server::context::RequestContext;

/// Variable bindings: one stack of values per name, so a nested loop over
/// the same name shadows the outer binding until it finishes.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: HashMap<String, Vec<Value>>,
}

impl Scope {
    pub fn push(&mut self, name: &str, value: Value) {
        self.bindings.entry(name.to_string()).or_default().push(value);
    }

    pub fn pop(&mut self, name: &str) -> Option<Value> {
        let stack = self.bindings.get_mut(name)?;
        let value = stack.pop();
        if stack.is_empty() {
            self.bindings.remove(name);
        }
        value
    }

    pub fn peek(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name).and_then(|stack| stack.last())
    }

    /// Replace the innermost binding of `name`.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.bindings.get_mut(name).and_then(|stack| stack.last_mut()) {
            Some(slot) => *slot = value,
            None => self.push(name, value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Executes one document against one request context.
///
/// Text is written verbatim, each echo writes its final stack bottom to
/// top, and loops re-run their body while the loop variable stays within
/// the end bound.
pub struct SmartScriptEngine<'d, 'c, 'o> {
    document: &'d Document,
    context: &'c mut RequestContext<'o>,
    scope: Scope,
}

impl<'d, 'c, 'o> SmartScriptEngine<'d, 'c, 'o> {
    pub fn new(document: &'d Document, context: &'c mut RequestContext<'o>) -> Self {
        Self {
            document,
            context,
            scope: Scope::default(),
        }
    }

    pub fn execute(mut self) -> Result<(), RuntimeError> {
        let document = self.document;
        self.visit_all(document.children())
    }

    fn visit_all(&mut self, nodes: &[Node]) -> Result<(), RuntimeError> {
        nodes.iter().try_for_each(|node| self.visit(node))
    }

    fn visit(&mut self, node: &Node) -> Result<(), RuntimeError> {
        match node {
            Node::Text(text) => {
                self.context.write_str(text.text())?;
                Ok(())
            }
            Node::ForLoop(for_loop) => self.visit_for(for_loop),
            Node::Echo(echo) => self.visit_echo(echo),
        }
    }

    fn visit_for(&mut self, node: &ForLoopNode) -> Result<(), RuntimeError> {
        let start = self.resolve(node.start())?.to_number()?;
        let end = self.resolve(node.end())?.to_number()?;
        let step = match node.step() {
            Some(step) => self.resolve(step)?.to_number()?,
            None => Number::Integer(1),
        };
        trace!(variable = node.variable(), ?start, ?end, ?step, "entering loop");

        self.scope.push(node.variable(), Value::from(start));
        let result = self.run_loop(node, start, end, step);
        self.scope.pop(node.variable());
        result
    }

    fn run_loop(
        &mut self,
        node: &ForLoopNode,
        start: Number,
        end: Number,
        step: Number,
    ) -> Result<(), RuntimeError> {
        let mut current = start;
        while within_bound(current, end, step) {
            self.visit_all(node.children())?;
            // A step past the integer range cannot land inside the bound.
            current = match current.apply(Operator::Add, step) {
                Ok(next) => next,
                Err(RuntimeError::Overflow { .. }) => break,
                Err(err) => return Err(err),
            };
            self.scope.set(node.variable(), Value::from(current));
        }
        Ok(())
    }

    fn visit_echo(&mut self, node: &EchoNode) -> Result<(), RuntimeError> {
        let mut stack: Vec<Value> = Vec::with_capacity(node.elements().len());
        for element in node.elements() {
            match element {
                Element::Operand(operand) => {
                    let value = self.resolve(operand)?;
                    stack.push(value);
                }
                Element::Operator(operator) => {
                    let available = stack.len();
                    let (Some(rhs), Some(lhs)) = (stack.pop(), stack.pop()) else {
                        return Err(RuntimeError::StackUnderflow {
                            operation: operator.symbol().to_string(),
                            required: 2,
                            available,
                        });
                    };
                    let result = lhs.to_number()?.apply(*operator, rhs.to_number()?)?;
                    stack.push(Value::from(result));
                }
                Element::Function(function) => function.apply(&mut stack, self.context)?,
            }
        }

        for value in &stack {
            self.context.write_str(&value.to_string())?;
        }
        Ok(())
    }

    fn resolve(&self, operand: &Operand) -> Result<Value, RuntimeError> {
        match operand {
            Operand::Variable(name) => {
                self.scope
                    .peek(name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() })
            }
            Operand::Integer(value) => Ok(Value::Integer(*value)),
            Operand::Double(value) => Ok(Value::Double(*value)),
            Operand::Str(value) => Ok(Value::Text(value.clone())),
        }
    }
}

/// A non-negative step counts up to `end`, a negative one counts down.
fn within_bound(current: Number, end: Number, step: Number) -> bool {
    if step.is_negative() {
        current.compare(end).is_ge()
    } else {
        current.compare(end).is_le()
    }
}
