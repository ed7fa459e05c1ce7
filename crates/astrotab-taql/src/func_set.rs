use crate::error::TaqlResult;
use crate::expr::ExprNode;
use crate::func::GroupFunc;
use crate::row_id::RowId;
use std::sync::Arc;

/// The aggregate functions of one group, in query order.
#[derive(Debug)]
pub struct GroupFuncSet {
    funcs: Vec<GroupFunc>,
    last_row: Option<RowId>,
}

impl GroupFuncSet {
    /// A fresh function per aggregate expression; the sequence numbers follow `aggregates`.
    pub fn new(aggregates: &[Arc<dyn ExprNode>]) -> TaqlResult<Self> {
        let mut set = Self {
            funcs: Vec::with_capacity(aggregates.len()),
            last_row: None,
        };
        for expr in aggregates {
            set.add(expr.make_group_func()?);
        }
        Ok(set)
    }

    /// Append a function and return its sequence number.
    pub fn add(&mut self, mut func: GroupFunc) -> usize {
        let seqnr = self.funcs.len();
        func.set_seqnr(seqnr);
        self.funcs.push(func);
        seqnr
    }

    /// Feed one row of the group to every function.
    pub fn apply(&mut self, id: RowId) -> TaqlResult<()> {
        self.last_row = Some(id);
        for func in &mut self.funcs {
            func.apply(id)?;
        }
        Ok(())
    }

    /// Finish the lazy functions.
    pub fn finish(&mut self) -> TaqlResult<()> {
        for func in self.funcs.iter_mut().filter(|f| f.is_lazy()) {
            func.finish()?;
        }
        Ok(())
    }

    pub fn funcs(&self) -> &[GroupFunc] {
        &self.funcs
    }

    pub fn func(&self, seqnr: usize) -> Option<&GroupFunc> {
        self.funcs.get(seqnr)
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// The most recent row applied to the group.
    pub fn last_row(&self) -> Option<RowId> {
        self.last_row
    }

    pub fn has_lazy(&self) -> bool {
        self.funcs.iter().any(GroupFunc::is_lazy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggr::{AggrNode, AggrOp};
    use crate::expr::RowNumberNode;
    use crate::func::FuncState;
    use pretty_assertions::assert_eq;

    #[test]
    fn applies_rows_to_every_function() {
        let aggregates: Vec<Arc<dyn ExprNode>> = vec![
            Arc::new(AggrNode::new(AggrOp::Count, None).unwrap()),
            Arc::new(AggrNode::new(AggrOp::Max, Some(Arc::new(RowNumberNode))).unwrap()),
        ];
        let mut set = GroupFuncSet::new(&aggregates).unwrap();
        assert!(!set.has_lazy());
        let id_seqnr = set.add(GroupFunc::expr_id());
        assert_eq!(id_seqnr, 2);
        assert!(set.has_lazy());

        for row in [5, 1, 8] {
            set.apply(RowId::new(row)).unwrap();
        }
        set.finish().unwrap();

        assert_eq!(set.last_row(), Some(RowId::new(8)));
        assert_eq!(set.funcs()[0].get_int().unwrap(), 3);
        assert_eq!(set.funcs()[1].get_int().unwrap(), 8);
        assert_eq!(
            set.func(2).unwrap().ids().unwrap(),
            &[RowId::new(5), RowId::new(1), RowId::new(8)]
        );
        assert_eq!(set.func(2).unwrap().state(), FuncState::Finalized);
        assert_eq!(set.funcs()[1].seqnr(), 1);
    }
}
