use crate::error::{MutationError, Result};
use crate::operators::Operator;

const DEFAULTS: [Operator; 7] = [
    Operator::ConditionalsBoundary,
    Operator::Increments,
    Operator::InvertNegs,
    Operator::Math,
    Operator::NegateConditionals,
    Operator::ReturnVals,
    Operator::VoidMethodCalls,
];

const REMOVE_CONDITIONALS: [Operator; 4] = [
    Operator::RemoveConditionalsEqualIf,
    Operator::RemoveConditionalsEqualElse,
    Operator::RemoveConditionalsOrderIf,
    Operator::RemoveConditionalsOrderElse,
];

/// Resolves operator and group selectors into concrete operators.
pub struct OperatorCatalogue;

impl OperatorCatalogue {
    /// Operators named by a single selector: an operator name or id, a group
    /// (`DEFAULTS`, `STRONGER`, `REMOVE_CONDITIONALS`) or `ALL`.
    pub fn by_name(name: &str) -> Result<Vec<Operator>> {
        let group = name.trim();
        if group.eq_ignore_ascii_case("DEFAULTS") {
            Ok(DEFAULTS.to_vec())
        } else if group.eq_ignore_ascii_case("STRONGER") {
            let mut operators = DEFAULTS.to_vec();
            operators.push(Operator::RemoveConditionalsEqualElse);
            Ok(operators)
        } else if group.eq_ignore_ascii_case("REMOVE_CONDITIONALS") {
            Ok(REMOVE_CONDITIONALS.to_vec())
        } else if group.eq_ignore_ascii_case("ALL") {
            Ok(Operator::ALL.to_vec())
        } else {
            group
                .parse::<Operator>()
                .map(|operator| vec![operator])
                .map_err(|_| MutationError::UnknownOperator(name.to_string()))
        }
    }

    /// Union of every selector's operators, in first-seen order.
    pub fn resolve<S: AsRef<str>>(names: &[S]) -> Result<Vec<Operator>> {
        let mut operators: Vec<Operator> = Vec::new();
        for name in names {
            for operator in Self::by_name(name.as_ref())? {
                if !operators.contains(&operator) {
                    operators.push(operator);
                }
            }
        }
        Ok(operators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_and_names_are_case_insensitive() {
        assert_eq!(OperatorCatalogue::by_name("defaults").expect("group").len(), 7);
        assert_eq!(
            OperatorCatalogue::by_name("math").expect("operator"),
            vec![Operator::Math]
        );
        assert_eq!(
            OperatorCatalogue::by_name("Remove_Conditionals").expect("group"),
            REMOVE_CONDITIONALS.to_vec()
        );
        assert_eq!(
            OperatorCatalogue::by_name("ALL").expect("all").len(),
            Operator::ALL.len()
        );
    }

    #[test]
    fn stronger_extends_defaults() {
        let stronger = OperatorCatalogue::by_name("STRONGER").expect("group");

        assert_eq!(&stronger[..7], &DEFAULTS[..]);
        assert_eq!(stronger[7], Operator::RemoveConditionalsEqualElse);
    }

    #[test]
    fn resolve_deduplicates_in_first_seen_order() {
        let operators =
            OperatorCatalogue::resolve(&["INLINE_CONSTS", "DEFAULTS", "MATH"]).expect("resolve");

        assert_eq!(operators[0], Operator::InlineConsts);
        assert_eq!(operators.len(), 8);
        assert_eq!(
            operators.iter().filter(|op| **op == Operator::Math).count(),
            1
        );
    }

    #[test]
    fn unknown_selector_is_rejected() {
        assert!(matches!(
            OperatorCatalogue::resolve(&["MATH", "FLIP_BITS"]),
            Err(MutationError::UnknownOperator(name)) if name == "FLIP_BITS"
        ));
    }
}
