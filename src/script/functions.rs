//! Built-in `@function` table.
//!
//! Every function pops a fixed number of values and pushes a fixed number
//! back. Arguments are listed in push order, so the last one named is the
//! one on top of the stack.

use crate::script::error::RuntimeError;
use crate::script::format::DecimalFormat;
use crate::script::value::Value;
use crate::server::context::RequestContext;

/// Name and stack effect of a built-in function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub name: &'static str,
    pub inputs: usize,
    pub outputs: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    /// `x -> sin(x)`, radians.
    Sin,
    /// `value pattern -> text`
    DecFmt,
    /// `x -> x x`
    Dup,
    /// `a b -> b a`
    Swap,
    /// `mime ->`
    SetMimeType,
    /// `name default -> value`
    ParamGet,
    /// `name default -> value`
    PParamGet,
    /// `value name ->`
    PParamSet,
    /// `name ->`
    PParamDel,
    /// `name default -> value`
    TParamGet,
    /// `value name ->`
    TParamSet,
    /// `name ->`
    TParamDel,
}

const ALL: [Function; 12] = [
    Function::Sin,
    Function::DecFmt,
    Function::Dup,
    Function::Swap,
    Function::SetMimeType,
    Function::ParamGet,
    Function::PParamGet,
    Function::PParamSet,
    Function::PParamDel,
    Function::TParamGet,
    Function::TParamSet,
    Function::TParamDel,
];

const fn sig(name: &'static str, inputs: usize, outputs: usize) -> Signature {
    Signature {
        name,
        inputs,
        outputs,
    }
}

impl Function {
    /// Look up a function by its exact (case-sensitive) name.
    pub fn from_name(name: &str) -> Option<Self> {
        ALL.into_iter().find(|function| function.name() == name)
    }

    pub fn signature(self) -> Signature {
        match self {
            Function::Sin => sig("sin", 1, 1),
            Function::DecFmt => sig("decfmt", 2, 1),
            Function::Dup => sig("dup", 1, 2),
            Function::Swap => sig("swap", 2, 2),
            Function::SetMimeType => sig("setMimeType", 1, 0),
            Function::ParamGet => sig("paramGet", 2, 1),
            Function::PParamGet => sig("pparamGet", 2, 1),
            Function::PParamSet => sig("pparamSet", 2, 0),
            Function::PParamDel => sig("pparamDel", 1, 0),
            Function::TParamGet => sig("tparamGet", 2, 1),
            Function::TParamSet => sig("tparamSet", 2, 0),
            Function::TParamDel => sig("tparamDel", 1, 0),
        }
    }

    pub fn name(self) -> &'static str {
        self.signature().name
    }

    pub fn all() -> impl Iterator<Item = Function> {
        ALL.into_iter()
    }

    /// Pop this function's inputs, apply it, and push its outputs.
    ///
    /// The stack is left untouched when it holds fewer values than the
    /// function consumes.
    pub fn apply(
        self,
        stack: &mut Vec<Value>,
        context: &mut RequestContext<'_>,
    ) -> Result<(), RuntimeError> {
        match self {
            Function::Sin => {
                let [x] = self.pop_args(stack)?;
                stack.push(Value::Double(x.to_number()?.as_f64().sin()));
            }
            Function::DecFmt => {
                let [value, pattern] = self.pop_args(stack)?;
                let format = DecimalFormat::parse(&pattern.to_string())?;
                stack.push(Value::Text(format.format(value.to_number()?.as_f64())));
            }
            Function::Dup => {
                let [x] = self.pop_args(stack)?;
                stack.push(x.clone());
                stack.push(x);
            }
            Function::Swap => {
                let [a, b] = self.pop_args(stack)?;
                stack.push(b);
                stack.push(a);
            }
            Function::SetMimeType => {
                let [mime] = self.pop_args(stack)?;
                context.set_mime_type(mime.to_string())?;
            }
            Function::ParamGet => {
                let [name, default] = self.pop_args(stack)?;
                let found = context.parameter(&name.to_string()).map(str::to_string);
                stack.push(found.map(Value::Text).unwrap_or(default));
            }
            Function::PParamGet => {
                let [name, default] = self.pop_args(stack)?;
                let found = context
                    .persistent_parameter(&name.to_string())
                    .map(str::to_string);
                stack.push(found.map(Value::Text).unwrap_or(default));
            }
            Function::PParamSet => {
                let [value, name] = self.pop_args(stack)?;
                context.set_persistent_parameter(name.to_string(), value.to_string());
            }
            Function::PParamDel => {
                let [name] = self.pop_args(stack)?;
                context.remove_persistent_parameter(&name.to_string());
            }
            Function::TParamGet => {
                let [name, default] = self.pop_args(stack)?;
                let found = context
                    .temporary_parameter(&name.to_string())
                    .map(str::to_string);
                stack.push(found.map(Value::Text).unwrap_or(default));
            }
            Function::TParamSet => {
                let [value, name] = self.pop_args(stack)?;
                context.set_temporary_parameter(name.to_string(), value.to_string());
            }
            Function::TParamDel => {
                let [name] = self.pop_args(stack)?;
                context.remove_temporary_parameter(&name.to_string());
            }
        }
        Ok(())
    }

    fn pop_args<const N: usize>(self, stack: &mut Vec<Value>) -> Result<[Value; N], RuntimeError> {
        let underflow = |available| RuntimeError::StackUnderflow {
            operation: format!("@{}", self.name()),
            required: N,
            available,
        };
        if stack.len() < N {
            return Err(underflow(stack.len()));
        }
        let args = stack.split_off(stack.len() - N);
        <[Value; N]>::try_from(args).map_err(|args| underflow(args.len()))
    }
}
