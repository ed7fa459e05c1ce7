use crate::error::{TaqlError, TaqlResult};
use crate::expr::{ExprNode, ValueKind};
use crate::func::{Combine, GroupFunc, LazyReduce};
use crate::row_id::RowId;
use astrotab_columnar::{DataType, Value};
use std::sync::Arc;

/// The aggregate functions understood by the GROUP BY engine.
///
/// The plural forms (`Sums`, `Mins`, ...) reduce array cells element by element and yield an
/// array of the cell shape; the singular forms reduce every element of every cell to a scalar.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AggrOp {
    Count,
    Sum,
    Product,
    SumSqr,
    Min,
    Max,
    Mean,
    Any,
    All,
    NTrue,
    First,
    Last,
    Rowid,
    Gather,
    Median,
    Fractile(f64),
    Variance,
    StdDev,
    Sums,
    Mins,
    Maxs,
    Means,
    Anys,
    Alls,
}

impl AggrOp {
    pub fn name(self) -> &'static str {
        match self {
            AggrOp::Count => "gcount",
            AggrOp::Sum => "gsum",
            AggrOp::Product => "gproduct",
            AggrOp::SumSqr => "gsumsqr",
            AggrOp::Min => "gmin",
            AggrOp::Max => "gmax",
            AggrOp::Mean => "gmean",
            AggrOp::Any => "gany",
            AggrOp::All => "gall",
            AggrOp::NTrue => "gntrue",
            AggrOp::First => "gfirst",
            AggrOp::Last => "glast",
            AggrOp::Rowid => "growid",
            AggrOp::Gather => "gaggr",
            AggrOp::Median => "gmedian",
            AggrOp::Fractile(_) => "gfractile",
            AggrOp::Variance => "gvariance",
            AggrOp::StdDev => "gstddev",
            AggrOp::Sums => "gsums",
            AggrOp::Mins => "gmins",
            AggrOp::Maxs => "gmaxs",
            AggrOp::Means => "gmeans",
            AggrOp::Anys => "ganys",
            AggrOp::Alls => "galls",
        }
    }

    fn is_elementwise(self) -> bool {
        matches!(
            self,
            AggrOp::Sums | AggrOp::Mins | AggrOp::Maxs | AggrOp::Means | AggrOp::Anys | AggrOp::Alls
        )
    }
}

/// An aggregate function applied to an operand expression.
#[derive(Debug, Clone)]
pub struct AggrNode {
    op: AggrOp,
    operand: Option<Arc<dyn ExprNode>>,
    data_type: DataType,
    kind: ValueKind,
}

impl AggrNode {
    /// Check the operand against the function and derive the result type.
    pub fn new(op: AggrOp, operand: Option<Arc<dyn ExprNode>>) -> TaqlResult<Self> {
        let name = op.name();
        let wrong_type = |dt: DataType| {
            TaqlError::Type(format!("aggregate function {name} does not accept {dt} operands"))
        };

        let operand_type = match (&operand, op) {
            (None, AggrOp::Count | AggrOp::Rowid) => None,
            (None, _) => {
                return Err(TaqlError::InvalidExpr(format!(
                    "aggregate function {name} needs an operand"
                )))
            }
            (Some(_), AggrOp::Rowid) => {
                return Err(TaqlError::InvalidExpr(format!(
                    "aggregate function {name} takes no operand"
                )))
            }
            (Some(e), _) => Some((e.data_type(), e.value_kind())),
        };

        if let Some((_, ValueKind::Scalar)) = operand_type {
            if op.is_elementwise() {
                return Err(TaqlError::Type(format!(
                    "aggregate function {name} needs an array operand"
                )));
            }
        }

        let (data_type, kind) = match (op, operand_type) {
            (AggrOp::Count, _) => (DataType::Int, ValueKind::Scalar),
            (AggrOp::Rowid, _) => (DataType::Int, ValueKind::Array),
            (_, None) => {
                return Err(TaqlError::InvalidExpr(format!(
                    "aggregate function {name} needs an operand"
                )))
            }
            (AggrOp::NTrue, Some((dt, _))) => match dt {
                DataType::Bool => (DataType::Int, ValueKind::Scalar),
                dt => return Err(wrong_type(dt)),
            },
            (AggrOp::Any | AggrOp::All, Some((dt, _))) => match dt {
                DataType::Bool => (DataType::Bool, ValueKind::Scalar),
                dt => return Err(wrong_type(dt)),
            },
            (AggrOp::Sum | AggrOp::Product | AggrOp::SumSqr, Some((dt, _))) => match dt {
                dt if dt.is_numeric() => (dt, ValueKind::Scalar),
                dt => return Err(wrong_type(dt)),
            },
            (AggrOp::Min | AggrOp::Max, Some((dt, _))) => match dt {
                DataType::Int | DataType::Double | DataType::String => (dt, ValueKind::Scalar),
                dt => return Err(wrong_type(dt)),
            },
            (AggrOp::Mean, Some((dt, _))) => match dt {
                DataType::Int | DataType::Double => (DataType::Double, ValueKind::Scalar),
                DataType::Complex => (DataType::Complex, ValueKind::Scalar),
                dt => return Err(wrong_type(dt)),
            },
            (AggrOp::First | AggrOp::Last, Some((dt, kind))) => (dt, kind),
            (AggrOp::Gather, Some((dt, _))) => (dt, ValueKind::Array),
            (
                AggrOp::Median | AggrOp::Fractile(_) | AggrOp::Variance | AggrOp::StdDev,
                Some((dt, _)),
            ) => match dt {
                DataType::Int | DataType::Double => (DataType::Double, ValueKind::Scalar),
                dt => return Err(wrong_type(dt)),
            },
            (AggrOp::Sums, Some((dt, _))) => match dt {
                dt if dt.is_numeric() => (dt, ValueKind::Array),
                dt => return Err(wrong_type(dt)),
            },
            (AggrOp::Mins | AggrOp::Maxs, Some((dt, _))) => match dt {
                DataType::Int | DataType::Double => (dt, ValueKind::Array),
                dt => return Err(wrong_type(dt)),
            },
            (AggrOp::Means, Some((dt, _))) => match dt {
                DataType::Int | DataType::Double => (DataType::Double, ValueKind::Array),
                DataType::Complex => (DataType::Complex, ValueKind::Array),
                dt => return Err(wrong_type(dt)),
            },
            (AggrOp::Anys | AggrOp::Alls, Some((dt, _))) => match dt {
                DataType::Bool => (DataType::Bool, ValueKind::Array),
                dt => return Err(wrong_type(dt)),
            },
        };

        if let AggrOp::Fractile(fraction) = op {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(TaqlError::InvalidExpr(format!(
                    "fraction {fraction} of {name} is outside [0,1]"
                )));
            }
        }

        Ok(Self {
            op,
            operand,
            data_type,
            kind,
        })
    }

    pub fn op(&self) -> AggrOp {
        self.op
    }

    pub fn operand(&self) -> Option<&Arc<dyn ExprNode>> {
        self.operand.as_ref()
    }

    fn operand_or_err(&self) -> TaqlResult<Arc<dyn ExprNode>> {
        self.operand.clone().ok_or_else(|| {
            TaqlError::InvalidExpr(format!(
                "aggregate function {} needs an operand",
                self.op.name()
            ))
        })
    }
}

impl ExprNode for AggrNode {
    fn name(&self) -> String {
        match &self.operand {
            Some(operand) => format!("{}({})", self.op.name(), operand.name()),
            None => format!("{}()", self.op.name()),
        }
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn value_kind(&self) -> ValueKind {
        self.kind
    }

    /// Aggregates have no per-row value; read them from a [`GroupFunc`] instead.
    fn get_value(&self, _id: RowId) -> TaqlResult<Value> {
        Err(TaqlError::InvalidExpr(format!(
            "aggregate {} cannot be evaluated for a single row",
            self.name()
        )))
    }

    fn is_aggregate(&self) -> bool {
        true
    }

    fn make_group_func(&self) -> TaqlResult<GroupFunc> {
        let name = self.op.name();
        let dt = self.data_type;
        Ok(match self.op {
            AggrOp::Count => GroupFunc::scalar(name, self.operand.clone(), dt, Combine::Count),
            AggrOp::NTrue => GroupFunc::scalar(name, self.operand.clone(), dt, Combine::NTrue),
            AggrOp::Any => GroupFunc::scalar(name, self.operand.clone(), dt, Combine::Any),
            AggrOp::All => GroupFunc::scalar(name, self.operand.clone(), dt, Combine::All),
            AggrOp::Sum => GroupFunc::scalar(name, self.operand.clone(), dt, Combine::Sum),
            AggrOp::Product => GroupFunc::scalar(name, self.operand.clone(), dt, Combine::Product),
            AggrOp::SumSqr => GroupFunc::scalar(name, self.operand.clone(), dt, Combine::SumSqr),
            AggrOp::Min => GroupFunc::scalar(name, self.operand.clone(), dt, Combine::Min),
            AggrOp::Max => GroupFunc::scalar(name, self.operand.clone(), dt, Combine::Max),
            AggrOp::Mean => GroupFunc::scalar(name, self.operand.clone(), dt, Combine::Mean),
            AggrOp::First => GroupFunc::first(name, self.operand_or_err()?),
            AggrOp::Last => GroupFunc::last(name, self.operand_or_err()?),
            AggrOp::Rowid => GroupFunc::rowid(name),
            AggrOp::Gather => GroupFunc::lazy(
                name,
                self.operand_or_err()?,
                dt,
                ValueKind::Array,
                LazyReduce::Gather,
            ),
            AggrOp::Median => self.reducer(LazyReduce::Median)?,
            AggrOp::Fractile(fraction) => self.reducer(LazyReduce::Fractile(fraction))?,
            AggrOp::Variance => self.reducer(LazyReduce::Variance)?,
            AggrOp::StdDev => self.reducer(LazyReduce::StdDev)?,
            AggrOp::Sums => GroupFunc::array(name, self.operand_or_err()?, dt, Combine::Sum),
            AggrOp::Mins => GroupFunc::array(name, self.operand_or_err()?, dt, Combine::Min),
            AggrOp::Maxs => GroupFunc::array(name, self.operand_or_err()?, dt, Combine::Max),
            AggrOp::Means => GroupFunc::array(name, self.operand_or_err()?, dt, Combine::Mean),
            AggrOp::Anys => GroupFunc::array(name, self.operand_or_err()?, dt, Combine::Any),
            AggrOp::Alls => GroupFunc::array(name, self.operand_or_err()?, dt, Combine::All),
        })
    }
}

impl AggrNode {
    fn reducer(&self, reduce: LazyReduce) -> TaqlResult<GroupFunc> {
        Ok(GroupFunc::lazy(
            self.op.name(),
            self.operand_or_err()?,
            DataType::Double,
            ValueKind::Scalar,
            reduce,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ConstNode, RowNumberNode};
    use astrotab_columnar::{ArrayValue, MArray};
    use pretty_assertions::assert_eq;

    fn rownr() -> Option<Arc<dyn ExprNode>> {
        Some(Arc::new(RowNumberNode))
    }

    #[test]
    fn result_types_follow_the_operand() {
        let mean = AggrNode::new(AggrOp::Mean, rownr()).unwrap();
        assert_eq!(mean.data_type(), DataType::Double);
        assert_eq!(mean.name(), "gmean(rownumber)");

        let count = AggrNode::new(AggrOp::Count, None).unwrap();
        assert_eq!(count.data_type(), DataType::Int);

        let rowid = AggrNode::new(AggrOp::Rowid, None).unwrap();
        assert_eq!(rowid.value_kind(), ValueKind::Array);
        assert!(rowid.is_aggregate());
    }

    #[test]
    fn operands_are_validated() {
        assert!(matches!(
            AggrNode::new(AggrOp::Any, rownr()),
            Err(TaqlError::Type(_))
        ));
        assert!(matches!(
            AggrNode::new(AggrOp::Sum, None),
            Err(TaqlError::InvalidExpr(_))
        ));
        assert!(matches!(
            AggrNode::new(AggrOp::Sums, rownr()),
            Err(TaqlError::Type(_))
        ));
        let names: Arc<dyn ExprNode> = Arc::new(ConstNode::new("3C286"));
        assert!(matches!(
            AggrNode::new(AggrOp::Product, Some(names)),
            Err(TaqlError::Type(_))
        ));
        assert!(matches!(
            AggrNode::new(AggrOp::Fractile(1.5), rownr()),
            Err(TaqlError::InvalidExpr(_))
        ));
    }

    #[test]
    fn scalar_sum_folds_array_elements() {
        let cells: Arc<dyn ExprNode> = Arc::new(ConstNode::new(ArrayValue::from(
            MArray::from_vec(vec![1i64, 2, 3]),
        )));
        let node = AggrNode::new(AggrOp::Sum, Some(cells)).unwrap();
        let mut func = node.make_group_func().unwrap();
        func.apply(RowId::new(0)).unwrap();
        func.apply(RowId::new(1)).unwrap();
        assert_eq!(func.get_value().unwrap(), Value::Int(12));
    }

    #[test]
    fn variance_uses_sample_denominator() {
        let node = AggrNode::new(AggrOp::Variance, rownr()).unwrap();
        let mut func = node.make_group_func().unwrap();
        for row in [2, 4, 4, 4, 5, 5, 7, 9] {
            func.apply(RowId::new(row)).unwrap();
        }
        func.finish().unwrap();
        assert_eq!(func.get_double().unwrap(), 32.0 / 7.0);
    }
}
