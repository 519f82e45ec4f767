//! Value-list chunking for membership predicates.
//!
//! Backends cap the number of literals in one `IN (...)` list. Long lists are
//! split into chunks that are OR'd together; NOT IN negates the whole OR
//! group. Lists longer than [`MAX_IN_VALUES`] are rejected before anything
//! reaches the backend.

use labsearch::{ConfigurationError, Value};

use crate::query::{CompareOp, Predicate, PropertyRef};

/// Hard limit on literal values in one membership test.
pub const MAX_IN_VALUES: usize = 32_768;

/// Default number of values per chunk.
pub const DEFAULT_IN_CHUNK_SIZE: usize = 1_000;

/// Splits `values` into slices of at most `size` elements.
///
/// A `size` of zero is treated as one.
pub fn chunk<T>(values: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    values.chunks(size.max(1))
}

/// Builds a chunked membership predicate.
///
/// With `case_insensitive` set, the list becomes an OR chain of
/// case-insensitive equalities and is not subject to the limit.
///
/// # Errors
///
/// [`ConfigurationError::InListTooLarge`] when a case-sensitive list has more
/// than [`MAX_IN_VALUES`] values.
pub fn in_predicate(
    property: &PropertyRef,
    values: &[Value],
    chunk_size: usize,
    case_insensitive: bool,
    negate: bool,
) -> Result<Predicate, ConfigurationError> {
    let group = if case_insensitive {
        Predicate::or(
            values
                .iter()
                .map(|value| Predicate::Compare {
                    property: property.clone(),
                    op: CompareOp::Eq,
                    value: value.clone(),
                    case_insensitive: true,
                })
                .collect(),
        )
    } else {
        if values.len() > MAX_IN_VALUES {
            return Err(ConfigurationError::InListTooLarge {
                count: values.len(),
                limit: MAX_IN_VALUES,
            });
        }
        Predicate::or(
            chunk(values, chunk_size.min(MAX_IN_VALUES))
                .map(|part| Predicate::In {
                    property: property.clone(),
                    values: part.to_vec(),
                })
                .collect(),
        )
    };

    Ok(if negate { Predicate::not(group) } else { group })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn longs(n: i64) -> Vec<Value> {
        (0..n).map(Value::Long).collect()
    }

    #[test]
    fn test_chunk_sizes() {
        let values: Vec<i32> = (0..2_500).collect();
        let sizes: Vec<usize> = chunk(&values, 1_000).map(<[i32]>::len).collect();
        assert_eq!(sizes, vec![1_000, 1_000, 500]);
    }

    #[test]
    fn test_chunk_zero_treated_as_one() {
        let values = [1, 2, 3];
        assert_eq!(chunk(&values, 0).count(), 3);
    }

    #[test]
    fn test_single_chunk_is_plain_in() {
        let p = in_predicate(&PropertyRef::root("id"), &longs(10), 1_000, false, false).unwrap();
        assert!(matches!(p, Predicate::In { ref values, .. } if values.len() == 10));
    }

    #[test]
    fn test_chunks_are_ored() {
        let p = in_predicate(&PropertyRef::root("id"), &longs(2_001), 1_000, false, false).unwrap();
        match p {
            Predicate::Or(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(parts.iter().all(|part| matches!(part, Predicate::In { .. })));
            }
            other => panic!("expected OR of chunks, got {other:?}"),
        }
    }

    #[test]
    fn test_not_in_negates_whole_group() {
        let p = in_predicate(&PropertyRef::root("id"), &longs(1_500), 1_000, false, true).unwrap();
        match p {
            Predicate::Not(inner) => assert!(matches!(*inner, Predicate::Or(ref parts) if parts.len() == 2)),
            other => panic!("expected NOT(OR), got {other:?}"),
        }
    }

    #[test]
    fn test_over_limit_rejected() {
        let err = in_predicate(&PropertyRef::root("id"), &longs(40_000), 1_000, false, false)
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::InListTooLarge {
                count: 40_000,
                limit: MAX_IN_VALUES
            }
        );
    }

    #[test]
    fn test_exact_limit_accepted() {
        let p = in_predicate(
            &PropertyRef::root("id"),
            &longs(MAX_IN_VALUES as i64),
            MAX_IN_VALUES,
            false,
            false,
        )
        .unwrap();
        assert_eq!(p.literal_count(), MAX_IN_VALUES);
    }

    #[test]
    fn test_case_insensitive_becomes_or_chain() {
        let values = vec![Value::from("abc"), Value::from("DEF")];
        let p = in_predicate(&PropertyRef::root("label"), &values, 1_000, true, false).unwrap();
        match p {
            Predicate::Or(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(parts.iter().all(|part| matches!(
                    part,
                    Predicate::Compare { op: CompareOp::Eq, case_insensitive: true, .. }
                )));
            }
            other => panic!("expected OR chain, got {other:?}"),
        }
    }
}
