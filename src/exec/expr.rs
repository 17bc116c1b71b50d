//! Expression trees evaluated against records during execution.
//!
//! Expressions are built by the (external) query compiler; evaluation is
//! free-function dispatch over the value sum. Evaluation never mutates the
//! expression, so a plan template can be shared across executions with
//! different parameter bindings.

use crate::error::{GraphError, Result};
use crate::exec::record::{Record, Slot};
use crate::exec::ExecCtx;
use crate::types::AttrId;
use crate::value::Value;

#[derive(Clone, Debug)]
pub enum Expr {
    /// Constant literal.
    Const(Value),
    /// Named query parameter, resolved from the execution context.
    Param(String),
    /// The raw contents of a record slot.
    SlotRef(usize),
    /// Attribute of the entity bound in a record slot.
    Attr { slot: usize, attr: AttrId },
    /// `id()` of the entity bound in a record slot.
    EntityId(usize),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl Expr {
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Const(value.into())
    }

    pub fn param(name: impl Into<String>) -> Self {
        Expr::Param(name.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Evaluates against `record`; pass an empty record for build-time
    /// evaluation of record-independent expressions.
    pub fn eval(&self, record: &Record, ctx: &ExecCtx<'_>) -> Result<Value> {
        match self {
            Expr::Const(v) => Ok(v.clone()),
            Expr::Param(name) => ctx
                .params
                .get(name)
                .cloned()
                .ok_or_else(|| GraphError::Compile(format!("missing parameter ${name}"))),
            Expr::SlotRef(idx) => Ok(match record.get(*idx) {
                Slot::Empty => Value::Null,
                Slot::Scalar(v) => v.clone(),
                Slot::Node(id) => Value::Int(*id as i64),
                Slot::Edge(e) => Value::Int(e.id as i64),
            }),
            Expr::Attr { slot, attr } => match record.get(*slot) {
                Slot::Node(id) => Ok(ctx
                    .g
                    .get_node(*id)
                    .and_then(|n| n.attrs.get(*attr))
                    .cloned()
                    .unwrap_or(Value::Null)),
                Slot::Edge(e) => Ok(ctx
                    .g
                    .get_edge(e.id)
                    .and_then(|e| e.attrs.get(*attr))
                    .cloned()
                    .unwrap_or(Value::Null)),
                Slot::Scalar(Value::Map(_)) => {
                    // attribute access on a map falls back to null; maps are
                    // keyed by string, resolved by the compiler
                    Ok(Value::Null)
                }
                Slot::Empty => Ok(Value::Null),
                other => Err(GraphError::TypeMismatch {
                    expected: "node or edge",
                    got: slot_type_name(other),
                }),
            },
            Expr::EntityId(slot) => match record.get(*slot) {
                Slot::Node(id) => Ok(Value::Int(*id as i64)),
                Slot::Edge(e) => Ok(Value::Int(e.id as i64)),
                Slot::Empty => Ok(Value::Null),
                other => Err(GraphError::TypeMismatch {
                    expected: "node or edge",
                    got: slot_type_name(other),
                }),
            },
            Expr::Unary { op, operand } => eval_unary(*op, operand.eval(record, ctx)?),
            Expr::Binary { op, lhs, rhs } => {
                eval_binary(*op, lhs.eval(record, ctx)?, rhs.eval(record, ctx)?)
            }
        }
    }
}

fn slot_type_name(slot: &Slot) -> &'static str {
    match slot {
        Slot::Empty => "nothing",
        Slot::Scalar(v) => v.type_name(),
        Slot::Node(_) => "node",
        Slot::Edge(_) => "edge",
    }
}

fn eval_unary(op: UnaryOp, v: Value) -> Result<Value> {
    match op {
        UnaryOp::Not => match v {
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(GraphError::TypeMismatch {
                expected: "bool",
                got: other.type_name(),
            }),
        },
        UnaryOp::Neg => match v {
            Value::Null => Ok(Value::Null),
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(GraphError::TypeMismatch {
                expected: "number",
                got: other.type_name(),
            }),
        },
    }
}

fn eval_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    use BinaryOp::*;
    match op {
        Add | Sub | Mul | Div | Mod => eval_arith(op, lhs, rhs),
        Eq | Ne | Lt | Le | Gt | Ge => eval_compare(op, lhs, rhs),
        And | Or => eval_logic(op, lhs, rhs),
    }
}

fn eval_arith(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    // string concatenation rides on Add
    if op == BinaryOp::Add {
        if let (Value::String(a), Value::String(b)) = (&lhs, &rhs) {
            return Ok(Value::String(format!("{a}{b}")));
        }
    }
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let a = *a;
            let b = *b;
            Ok(match op {
                BinaryOp::Add => Value::Int(a.wrapping_add(b)),
                BinaryOp::Sub => Value::Int(a.wrapping_sub(b)),
                BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
                BinaryOp::Div => {
                    if b == 0 {
                        return Err(GraphError::InvalidArgument("division by zero".into()));
                    }
                    Value::Int(a.wrapping_div(b))
                }
                BinaryOp::Mod => {
                    if b == 0 {
                        return Err(GraphError::InvalidArgument("division by zero".into()));
                    }
                    Value::Int(a.wrapping_rem(b))
                }
                _ => unreachable!(),
            })
        }
        _ => {
            let (a, b) = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(GraphError::TypeMismatch {
                        expected: "number",
                        got: if lhs.as_f64().is_none() {
                            lhs.type_name()
                        } else {
                            rhs.type_name()
                        },
                    })
                }
            };
            Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
                _ => unreachable!(),
            }))
        }
    }
}

fn eval_compare(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    let ord = lhs.cmp_total(&rhs);
    Ok(Value::Bool(match op {
        BinaryOp::Eq => ord.is_eq(),
        BinaryOp::Ne => ord.is_ne(),
        BinaryOp::Lt => ord.is_lt(),
        BinaryOp::Le => ord.is_le(),
        BinaryOp::Gt => ord.is_gt(),
        BinaryOp::Ge => ord.is_ge(),
        _ => unreachable!(),
    }))
}

fn eval_logic(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    let as_bool = |v: &Value| -> Result<Option<bool>> {
        match v {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            other => Err(GraphError::TypeMismatch {
                expected: "bool",
                got: other.type_name(),
            }),
        }
    };
    let a = as_bool(&lhs)?;
    let b = as_bool(&rhs)?;
    Ok(match op {
        BinaryOp::And => match (a, b) {
            (Some(false), _) | (_, Some(false)) => Value::Bool(false),
            (Some(true), Some(true)) => Value::Bool(true),
            _ => Value::Null,
        },
        BinaryOp::Or => match (a, b) {
            (Some(true), _) | (_, Some(true)) => Value::Bool(true),
            (Some(false), Some(false)) => Value::Bool(false),
            _ => Value::Null,
        },
        _ => unreachable!(),
    })
}
