use super::{Filter, FilterError, FilterOperation};

/// Check which operators may be combined on a single field.
///
/// Every broken rule is reported; any broken rule fails the field.
///
/// # Errors
///
/// One [`FilterError::Combination`] per broken rule, in rule order.
pub fn check_combinations(filters: &[Filter]) -> Result<(), Vec<FilterError>> {
    use FilterOperation as Op;

    let mut used: Vec<FilterOperation> = Vec::with_capacity(filters.len());
    let mut duplicates: Vec<FilterOperation> = Vec::new();
    let mut errors = Vec::new();

    for op in filters.iter().map(Filter::op) {
        if used.contains(&op) && !duplicates.contains(&op) {
            duplicates.push(op);
            errors.push(format!(
                "cannot use an operator twice for the same field. {op} used multiple times"
            ));
        }
        used.push(op);
    }

    let has = |op: FilterOperation| used.contains(&op);
    let listed = || {
        used.iter()
            .map(|op| op.as_str())
            .collect::<Vec<_>>()
            .join(",")
    };
    let combined = used.len() >= 2;

    if combined && has(Op::Eq) {
        errors.push(format!(
            "eq can only be used exclusively. [{}] used at the same time",
            listed()
        ));
    } else if combined && (has(Op::Null) || has(Op::Exists)) {
        errors.push(format!(
            "null and exists operators should be used exclusively. [{}] used at the same time",
            listed()
        ));
    } else if combined && has(Op::In) {
        errors.push(format!(
            "in operator should be used exclusively. [{}] used at the same time",
            listed()
        ));
    }

    for (a, b) in [(Op::Gt, Op::Gte), (Op::Lt, Op::Lte), (Op::Like, Op::Ilike)] {
        if has(a) && has(b) {
            errors.push(format!("{a} and {b} operators should not be used together"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into_iter().map(FilterError::Combination).collect())
    }
}
