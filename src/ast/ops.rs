//! Operator overloads that build expression nodes.
//!
//! `&`, `|` and `!` stand for AND, OR and NOT; `&&`/`||` cannot be
//! overloaded. Arithmetic maps one to one. A raw scalar on either side is
//! wrapped into a literal.

use std::ops::{Add, BitAnd, BitOr, Div, Mul, Neg, Not, Rem, Sub};

use super::expr::Expr;
use super::types::{BinaryOperator, UnaryOperator};

macro_rules! binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Expr>> $trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::binary($op, self, rhs.into())
            }
        }
    };
}

binary_op!(BitAnd, bitand, BinaryOperator::And);
binary_op!(BitOr, bitor, BinaryOperator::Or);
binary_op!(Add, add, BinaryOperator::Plus);
binary_op!(Sub, sub, BinaryOperator::Minus);
binary_op!(Mul, mul, BinaryOperator::Multiply);
binary_op!(Div, div, BinaryOperator::Divide);
binary_op!(Rem, rem, BinaryOperator::Modulo);

// Scalar on the left: `1 + col("x")`.
macro_rules! scalar_lhs {
    ($scalar:ty => $(($trait:ident, $method:ident, $op:expr)),*) => {
        $(
            impl $trait<Expr> for $scalar {
                type Output = Expr;

                fn $method(self, rhs: Expr) -> Expr {
                    Expr::binary($op, Expr::from(self), rhs)
                }
            }
        )*
    };
}

scalar_lhs!(i32 =>
    (Add, add, BinaryOperator::Plus),
    (Sub, sub, BinaryOperator::Minus),
    (Mul, mul, BinaryOperator::Multiply),
    (Div, div, BinaryOperator::Divide),
    (Rem, rem, BinaryOperator::Modulo)
);
scalar_lhs!(i64 =>
    (Add, add, BinaryOperator::Plus),
    (Sub, sub, BinaryOperator::Minus),
    (Mul, mul, BinaryOperator::Multiply),
    (Div, div, BinaryOperator::Divide),
    (Rem, rem, BinaryOperator::Modulo)
);
scalar_lhs!(f64 =>
    (Add, add, BinaryOperator::Plus),
    (Sub, sub, BinaryOperator::Minus),
    (Mul, mul, BinaryOperator::Multiply),
    (Div, div, BinaryOperator::Divide)
);
scalar_lhs!(bool =>
    (BitAnd, bitand, BinaryOperator::And),
    (BitOr, bitor, BinaryOperator::Or)
);

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::unary(UnaryOperator::Not, self)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::unary(UnaryOperator::Minus, self)
    }
}
