use super::*;

use std::cmp::Ordering;

use mw_core::construction::{BinOp, UnOp};
use mw_core::context::ContextEntry;
use mw_core::error::Error;

fn overflow(op: BinOp, lhs: i64, rhs: i64) -> Error {
    Error::operator(format!("{} {} {} overflows", lhs, op.symbol(), rhs))
}

fn mismatch(op: BinOp, lhs: &Value, rhs: &Value) -> Error {
    Error::operator(format!(
        "cannot apply {} to {} and {}",
        op.symbol(),
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn float_op(op: BinOp, lhs: f64, rhs: f64) -> f64 {
    match op {
        BinOp::Add => lhs + rhs,
        BinOp::Sub => lhs - rhs,
        BinOp::Mul => lhs * rhs,
        BinOp::Div => lhs / rhs,
        _ => lhs % rhs,
    }
}

fn arithmetic(op: BinOp, lhs: Value, rhs: Value) -> Result<Value> {
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            if matches!(op, BinOp::Div | BinOp::Mod) && b == 0 {
                return Err(Error::operator(format!("{} {} 0", a, op.symbol())));
            }
            let result = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                BinOp::Div => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            result.map(Value::Int).ok_or_else(|| overflow(op, a, b))
        }
        (a, b) if a.is_numeric() && b.is_numeric() => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(float_op(op, a, b))),
            _ => Err(mismatch(op, &lhs, &rhs)),
        },
        (Value::Text(_), _) | (_, Value::Text(_)) if op == BinOp::Add => {
            Ok(Value::Text(format!("{}{}", lhs, rhs)))
        }
        (Value::List(a), Value::List(b)) if op == BinOp::Add => {
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        _ => Err(mismatch(op, &lhs, &rhs)),
    }
}

fn comparison(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    let ordering = lhs.compare(rhs).ok_or_else(|| mismatch(op, lhs, rhs))?;
    Ok(Value::Bool(match op {
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Le => ordering != Ordering::Greater,
        BinOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    }))
}

impl Evaluator {
    pub(super) fn binary(
        &self,
        ctx: &mut Context,
        op: BinOp,
        lhs: &Construction,
        rhs: &Construction,
    ) -> Result<Value> {
        let left = self.evaluate(ctx, lhs)?.settle()?;
        match op {
            BinOp::And if !left.is_truthy() => return Ok(Value::Bool(false)),
            BinOp::Or if left.is_truthy() => return Ok(Value::Bool(true)),
            _ => {}
        }
        let right = self.evaluate(ctx, rhs)?.settle()?;
        match op {
            BinOp::And | BinOp::Or => Ok(Value::Bool(right.is_truthy())),
            BinOp::Eq => Ok(Value::Bool(left.loosely_equals(&right))),
            BinOp::Ne => Ok(Value::Bool(!left.loosely_equals(&right))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => comparison(op, &left, &right),
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                arithmetic(op, left, right)
            }
        }
    }

    pub(super) fn unary(&self, ctx: &mut Context, op: UnOp, operand: &Construction) -> Result<Value> {
        let value = self.evaluate(ctx, operand)?.settle()?;
        match (op, value) {
            (UnOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
            (UnOp::Neg, Value::Int(n)) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| Error::operator(format!("-{} overflows", n))),
            (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnOp::Neg, other) => Err(Error::operator(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        }
    }

    /// Evaluate `body` once per item with `var` bound in a loop frame. Table
    /// items are `key`/`value` pairs; an integer counts from zero.
    pub(super) fn for_loop(
        &self,
        ctx: &mut Context,
        var: &str,
        iterable: &Construction,
        body: &[Construction],
    ) -> Result<Value> {
        let items = match self.evaluate(ctx, iterable)?.settle()? {
            Value::Null => Vec::new(),
            Value::List(items) => items,
            Value::Table(entries) => entries
                .into_iter()
                .map(|(key, value)| {
                    Value::Table(vec![("key".to_string(), Value::Text(key)), ("value".to_string(), value)])
                })
                .collect(),
            Value::Int(n) => (0..n.max(0)).map(Value::Int).collect(),
            other => {
                return Err(Error::operator(format!(
                    "cannot iterate over {}",
                    other.type_name()
                )))
            }
        };
        let owner = ctx
            .entries()
            .iter()
            .rev()
            .filter(|entry| !entry.is_loop())
            .find_map(|entry| entry.def_id())
            .unwrap_or_else(|| self.table().root());

        let mut rendered = Vec::with_capacity(items.len());
        for item in items {
            let mut frame = ctx.enter(ContextEntry::loop_frame(owner, var, item));
            let value = self.evaluate_block(&mut frame, body)?.settle()?;
            rendered.push(value.to_string());
        }
        Ok(Value::Text(rendered.concat()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn integer_arithmetic_is_checked() {
        assert_eq!(
            arithmetic(BinOp::Add, Value::Int(2), Value::Int(3)).unwrap(),
            Value::Int(5)
        );
        let err = arithmetic(BinOp::Mul, Value::Int(i64::MAX), Value::Int(2)).unwrap_err();
        assert!(err.to_string().contains("overflows"));
        assert!(arithmetic(BinOp::Mod, Value::Int(1), Value::Int(0)).is_err());
    }

    #[test]
    fn mixed_numbers_widen_to_float() {
        assert_eq!(
            arithmetic(BinOp::Mul, Value::Int(2), Value::Float(1.5)).unwrap(),
            Value::Float(3.0)
        );
    }

    #[test]
    fn text_concatenation_renders_the_other_side() {
        assert_eq!(
            arithmetic(BinOp::Add, Value::text("n="), Value::Int(4)).unwrap(),
            Value::text("n=4")
        );
        assert!(arithmetic(BinOp::Sub, Value::text("a"), Value::Int(1)).is_err());
    }

    #[test]
    fn lists_concatenate() {
        let joined = arithmetic(
            BinOp::Add,
            Value::List(vec![Value::Int(1)]),
            Value::List(vec![Value::Int(2)]),
        )
        .unwrap();
        assert_eq!(joined, Value::List(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn incomparable_values_are_operator_errors() {
        assert_eq!(
            comparison(BinOp::Le, &Value::Int(2), &Value::Int(2)).unwrap(),
            Value::Bool(true)
        );
        assert!(comparison(BinOp::Lt, &Value::Int(1), &Value::List(vec![])).is_err());
    }
}
