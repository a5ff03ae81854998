use crate::error::Result;
use crate::expr::{Expr, SequenceOperator};
use crate::ir::{
    EnumerableQuery, Leaf, Projection, Select, SetOperationTable, SetOperator, Table,
};

use super::{rewrite_projection, sequence, Composer};

fn set_operator(operator: SequenceOperator) -> Option<SetOperator> {
    match operator {
        SequenceOperator::Concat => Some(SetOperator::UnionAll),
        SequenceOperator::Union => Some(SetOperator::Union),
        SequenceOperator::Except => Some(SetOperator::Except),
        SequenceOperator::Intersect => Some(SetOperator::Intersect),
        _ => None,
    }
}

impl<'p> Composer<'p> {
    /// Both sides must project the same server columns; the result reads
    /// them from the set operation as a derived table.
    pub(super) fn compose_set_operation(
        &mut self,
        query: &EnumerableQuery,
        args: &[Expr],
        operator: SequenceOperator,
    ) -> Result<Option<Expr>> {
        let Some(set_operator) = set_operator(operator) else {
            return Ok(None);
        };
        let [other] = args else {
            return Ok(None);
        };
        let other = self.visit(other.clone(), false)?;
        let other = self.process_query_source(other);
        let Some(other) = other.as_sequence() else {
            return Ok(None);
        };

        let left = query.select.without_unpaginated_ordering();
        let right = other.select.without_unpaginated_ordering();
        if !self.set_operand(&left) || !self.set_operand(&right) {
            return Ok(None);
        }
        let names = |select: &Select| -> Vec<String> {
            select
                .projection
                .server_leaves()
                .iter()
                .map(Leaf::name)
                .collect()
        };
        if names(&left) != names(&right) {
            return Ok(None);
        }

        let alias = self.aliases.fresh("");
        let projection = rewrite_projection(&alias, &left.projection);
        let table = Table::SetOperation(Box::new(SetOperationTable {
            operator: set_operator,
            left,
            right,
            alias,
        }));
        Ok(Some(sequence(Select::new(projection, Some(table)))))
    }

    fn set_operand(&self, select: &Select) -> bool {
        match &select.projection {
            Projection::Server(body) => self.translatable(body),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_is_union_all() {
        assert_eq!(
            set_operator(SequenceOperator::Concat),
            Some(SetOperator::UnionAll)
        );
        assert_eq!(set_operator(SequenceOperator::Where), None);
    }
}
