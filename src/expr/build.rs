//! Constructors for writing expression trees by hand.
//!
//! ```ignore
//! let query = source("items", &["A", "B"])
//!     .call(SequenceOperator::Where, vec![lambda(&["x"], param("x").member("A").greater_than(constant(1)))])
//!     .call(SequenceOperator::Select, vec![lambda(&["x"], param("x").member("B"))]);
//! ```

use super::*;

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

pub fn constant(value: impl Into<Value>) -> Expr {
    Expr::Constant(value.into())
}

pub fn null() -> Expr {
    Expr::Constant(Value::Null)
}

pub fn param(name: &str) -> Expr {
    Expr::Parameter(name.to_string())
}

pub fn query_param(name: &str) -> Expr {
    Expr::QueryParameter(name.to_string())
}

pub fn column(table: &str, name: &str) -> Expr {
    Expr::Column {
        table: table.to_string(),
        name: name.to_string(),
    }
}

pub fn lambda(params: &[&str], body: Expr) -> Expr {
    Expr::Lambda(Box::new(Lambda::new(
        params.iter().map(|p| p.to_string()).collect(),
        body,
    )))
}

pub fn record(fields: Vec<(&str, Expr)>) -> Expr {
    Expr::Record {
        type_name: None,
        fields: fields
            .into_iter()
            .map(|(name, e)| (name.to_string(), e))
            .collect(),
    }
}

pub fn client_call(function: &str, args: Vec<Expr>) -> Expr {
    Expr::ClientCall {
        function: function.to_string(),
        args,
    }
}

pub fn comparer(name: &str) -> Expr {
    Expr::Comparer(name.to_string())
}

pub fn source(table: &str, columns: &[&str]) -> Expr {
    Expr::Source(QuerySource {
        schema: None,
        table: table.to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        entity: None,
    })
}

/// Join a list of predicates with `AndAlso`; `None` when the list is empty.
pub fn and_all(predicates: Vec<Expr>) -> Option<Expr> {
    predicates.into_iter().reduce(|acc, p| acc.and(p))
}

impl Expr {
    fn binary(self, op: BinaryOperator, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    /// Call `operator` on this sequence through the queryable surface.
    pub fn call(self, operator: SequenceOperator, args: Vec<Expr>) -> Expr {
        let mut all = vec![self];
        all.extend(args);
        Expr::Call(Box::new(QueryCall::new(operator, CallOrigin::Queryable, all)))
    }

    /// Call `operator` on this sequence as an in-memory sequence.
    pub fn call_in_memory(self, operator: SequenceOperator, args: Vec<Expr>) -> Expr {
        let mut all = vec![self];
        all.extend(args);
        Expr::Call(Box::new(QueryCall::new(operator, CallOrigin::InMemory, all)))
    }

    /// `OfType<T>` / `Cast<T>`.
    pub fn call_typed(self, operator: SequenceOperator, type_argument: &str) -> Expr {
        let mut call = QueryCall::new(operator, CallOrigin::Queryable, vec![self]);
        call.type_argument = Some(type_argument.to_string());
        Expr::Call(Box::new(call))
    }

    pub fn member(self, member: &str) -> Expr {
        Expr::Member {
            expr: Box::new(self),
            member: member.to_string(),
        }
    }

    pub fn equal(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Equal, right)
    }

    pub fn not_equal(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::NotEqual, right)
    }

    pub fn less_than(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::LessThan, right)
    }

    pub fn less_or_equal(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::LessThanOrEqual, right)
    }

    pub fn greater_than(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::GreaterThan, right)
    }

    pub fn greater_or_equal(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::GreaterThanOrEqual, right)
    }

    pub fn and(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::AndAlso, right)
    }

    pub fn or(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::OrElse, right)
    }

    pub fn add(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Add, right)
    }

    pub fn coalesce(self, right: Expr) -> Expr {
        self.binary(BinaryOperator::Coalesce, right)
    }

    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOperator::Not,
            expr: Box::new(self),
        }
    }

    pub fn if_else(self, if_true: Expr, if_false: Expr) -> Expr {
        Expr::Conditional {
            test: Box::new(self),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_puts_source_first() {
        let expr = source("items", &["A"]).call(SequenceOperator::Take, vec![constant(5)]);
        match expr {
            Expr::Call(call) => {
                assert_eq!(call.operator, SequenceOperator::Take);
                assert_eq!(call.origin, CallOrigin::Queryable);
                assert!(matches!(call.source(), Some(Expr::Source(_))));
                assert_eq!(call.args[1], constant(5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_and_all() {
        assert_eq!(and_all(vec![]), None);
        assert_eq!(and_all(vec![param("a")]), Some(param("a")));
        assert_eq!(
            and_all(vec![param("a"), param("b"), param("c")]),
            Some(param("a").and(param("b")).and(param("c")))
        );
    }
}
