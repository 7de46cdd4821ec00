//! Type-dispatched comparisons.
//!
//! A compared tag's storage column is not known at compile time: it follows from the
//! tag's ancestors (`temp` is a `number`, `siteRef` a `ref`, ...). The comparison is
//! therefore emitted as a `CASE` whose branches test ancestor-set membership and compare
//! the matching typed column. Only the branches that can apply to the literal's lexical
//! type are emitted.

use sea_query::{Alias, BinOper, CaseStatement, Expr, SimpleExpr};

use crate::ast::CmpOp;
use crate::hierarchy::Ancestry;
use crate::sea_query_extra::member_pattern;
use crate::sql_common::{col_of, Col};
use crate::value_type::{TypedValue, ValueType};

/// The storage family a branch compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    /// `value_n` or `value_ref`
    Numeric,
    /// `value_b`
    Boolean,
    /// `value_s`
    Text,
    /// `value_ts`
    Temporal,
    /// `value_s IN (...)`
    Membership,
    /// `value_ref` followed into the entities of the next path segment
    Reference,
}

/// One `WHEN <ancestor test> THEN <typed comparison>`
#[derive(Debug, Clone)]
pub struct CaseBranch {
    pub kind: BranchKind,
    pub when: SimpleExpr,
    pub then: SimpleExpr,
}

fn cmp_op_to_sql_binary(op: CmpOp) -> BinOper {
    match op {
        CmpOp::Eq => BinOper::Equal,
        CmpOp::Ne => BinOper::NotEqual,
        CmpOp::Lt => BinOper::SmallerThan,
        CmpOp::Le => BinOper::SmallerThanOrEqual,
        CmpOp::Gt => BinOper::GreaterThan,
        CmpOp::Ge => BinOper::GreaterThanOrEqual,
    }
}

/// `hq{n}.parent_id LIKE '%,<ancestor>,%'`
pub fn has_ancestor(ancestry: &Ancestry, ancestor: &str) -> SimpleExpr {
    ancestry.parent_ids().like(member_pattern(ancestor))
}

fn fact_col(ancestry: &Ancestry, col: Col) -> SimpleExpr {
    Expr::col(col_of(&ancestry.aliases.fact(), col)).into()
}

fn compare(left: SimpleExpr, op: CmpOp, right: SimpleExpr) -> SimpleExpr {
    left.binary(cmp_op_to_sql_binary(op), right)
}

/// Numeric and reference literals compare against `value_n` for numbers and `value_ref` for refs
pub fn numeric_branches(ancestry: &Ancestry, op: CmpOp, value: &TypedValue) -> Vec<CaseBranch> {
    if !matches!(value.ty(), ValueType::Number | ValueType::Ref) {
        return vec![];
    }
    vec![
        CaseBranch {
            kind: BranchKind::Numeric,
            when: has_ancestor(ancestry, "number"),
            then: compare(fact_col(ancestry, Col::ValueN), op, value.to_sql()),
        },
        CaseBranch {
            kind: BranchKind::Numeric,
            when: has_ancestor(ancestry, "ref"),
            then: compare(fact_col(ancestry, Col::ValueRef), op, value.to_sql()),
        },
    ]
}

pub fn boolean_branches(ancestry: &Ancestry, op: CmpOp, value: &TypedValue) -> Vec<CaseBranch> {
    if value.ty() != ValueType::Bool {
        return vec![];
    }
    vec![CaseBranch {
        kind: BranchKind::Boolean,
        when: has_ancestor(ancestry, "bool"),
        then: compare(fact_col(ancestry, Col::ValueB), op, value.to_sql()),
    }]
}

/// Strings and URIs both live in `value_s`
pub fn text_branches(ancestry: &Ancestry, op: CmpOp, value: &TypedValue) -> Vec<CaseBranch> {
    if !matches!(value.ty(), ValueType::Str | ValueType::Uri) {
        return vec![];
    }
    vec![CaseBranch {
        kind: BranchKind::Text,
        when: has_ancestor(ancestry, "str"),
        then: compare(fact_col(ancestry, Col::ValueS), op, value.to_sql()),
    }]
}

/// Dates compare the full timestamp, times only its time of day
pub fn temporal_branches(ancestry: &Ancestry, op: CmpOp, value: &TypedValue) -> Vec<CaseBranch> {
    let column = match value.ty() {
        ValueType::Date => fact_col(ancestry, Col::ValueTs),
        ValueType::Time => fact_col(ancestry, Col::ValueTs).cast_as(Alias::new("time")),
        _ => return vec![],
    };
    vec![CaseBranch {
        kind: BranchKind::Temporal,
        when: has_ancestor(ancestry, "date").or(has_ancestor(ancestry, "dateTime")),
        then: compare(column, op, value.to_sql()),
    }]
}

/// All branches reachable for `op value`
pub fn comparison_branches(ancestry: &Ancestry, op: CmpOp, value: &TypedValue) -> Vec<CaseBranch> {
    let mut branches = numeric_branches(ancestry, op, value);
    branches.extend(boolean_branches(ancestry, op, value));
    branches.extend(text_branches(ancestry, op, value));
    branches.extend(temporal_branches(ancestry, op, value));
    branches
}

/// `in` is only defined on strings and needs no per-type dispatch beyond the string test
pub fn membership_branch(ancestry: &Ancestry, values: &[TypedValue]) -> CaseBranch {
    CaseBranch {
        kind: BranchKind::Membership,
        when: has_ancestor(ancestry, "str"),
        then: Expr::col(col_of(&ancestry.aliases.fact(), Col::ValueS))
            .is_in(values.iter().map(TypedValue::to_sql)),
    }
}

/// Combine branches into `CASE WHEN .. THEN .. END`. Rows matching no branch yield NULL,
/// which a `WHERE` treats as false.
pub fn case_of(branches: Vec<CaseBranch>) -> SimpleExpr {
    branches
        .into_iter()
        .fold(CaseStatement::new(), |case, b| case.case(b.when, b.then))
        .into()
}
