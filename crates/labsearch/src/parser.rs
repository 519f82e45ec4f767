//! Parsers for the compact criteria-path and order-path notations.
//!
//! ```text
//! path     := segment ( "->" segment )*
//! segment  := ident ( "." ident )*
//! order    := segment [ ("ASC" | "DESC") ]
//! ident    := [A-Za-z_][A-Za-z0-9_]*
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{char, multispace0, multispace1, satisfy},
    combinator::{all_consuming, map, opt, recognize, value},
    multi::separated_list1,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::error::{CatalogResult, ConfigurationError};
use crate::path::{CriteriaPath, OrderDirection, OrderSpec, PathSegment};

/// Parses a criteria path such as `labBatches.batchName` or
/// `bucketEntries.labBatch -> labBatches.batchName`.
pub fn parse_criteria_path(input: &str) -> CatalogResult<CriteriaPath> {
    let text = input.trim();
    if text.is_empty() {
        return Err(invalid(input, 0, "empty path"));
    }

    let raw_segments = run(input, text, all_consuming(criteria_path)(text))?;
    let last = raw_segments.len() - 1;
    let mut segments = Vec::with_capacity(raw_segments.len());
    let mut property = String::new();

    for (i, mut idents) in raw_segments.into_iter().enumerate() {
        if i > 0 && idents.len() < 2 {
            return Err(invalid(
                input,
                0,
                "nested segment needs a projection and a property",
            ));
        }
        // separated_list1 guarantees at least one identifier
        let tail = idents.pop().unwrap_or_default();
        let parent = i.checked_sub(1);
        if i == last {
            property = tail;
            segments.push(PathSegment::new(idents, None, parent));
        } else {
            segments.push(PathSegment::new(idents, Some(tail), parent));
        }
    }

    Ok(CriteriaPath::from_parts(segments, property))
}

/// Parses an order path such as `mercurySamples.sampleKey DESC`.
pub fn parse_order_spec(input: &str) -> CatalogResult<OrderSpec> {
    let text = input.trim();
    if text.is_empty() {
        return Err(invalid(input, 0, "empty order path"));
    }

    let (mut idents, direction) = run(input, text, all_consuming(order_spec)(text))?;
    let property = idents.pop().unwrap_or_default();
    Ok(OrderSpec {
        hops: idents,
        property,
        direction: direction.unwrap_or_default(),
    })
}

fn run<T>(original: &str, text: &str, result: IResult<&str, T>) -> CatalogResult<T> {
    match result {
        Ok((_, parsed)) => Ok(parsed),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let position = text.len() - e.input.len();
            Err(invalid(
                original,
                position,
                &format!("unexpected input at: '{}'", truncate(e.input, 20)),
            ))
        }
        Err(nom::Err::Incomplete(_)) => Err(invalid(original, text.len(), "incomplete path")),
    }
}

fn invalid(path: &str, position: usize, message: &str) -> ConfigurationError {
    ConfigurationError::InvalidPath {
        path: path.to_string(),
        position,
        message: message.to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ============================================================================
// Grammar
// ============================================================================

fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        )),
        String::from,
    )(input)
}

fn segment(input: &str) -> IResult<&str, Vec<String>> {
    separated_list1(char('.'), identifier)(input)
}

fn arrow(input: &str) -> IResult<&str, &str> {
    delimited(multispace0, tag("->"), multispace0)(input)
}

fn criteria_path(input: &str) -> IResult<&str, Vec<Vec<String>>> {
    separated_list1(arrow, segment)(input)
}

fn direction(input: &str) -> IResult<&str, OrderDirection> {
    alt((
        value(OrderDirection::Desc, tag_no_case("desc")),
        value(OrderDirection::Asc, tag_no_case("asc")),
    ))(input)
}

fn order_spec(input: &str) -> IResult<&str, (Vec<String>, Option<OrderDirection>)> {
    tuple((segment, opt(preceded(multispace1, direction))))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_root_property() {
        let path = parse_criteria_path("label").unwrap();
        assert!(path.is_root_property());
        assert_eq!(path.property(), "label");
    }

    #[test]
    fn test_parse_hops() {
        let path = parse_criteria_path("  mercurySamples.sampleKey ").unwrap();
        assert_eq!(path.first_segment().hops(), ["mercurySamples".to_string()]);
        assert_eq!(path.property(), "sampleKey");
    }

    #[test]
    fn test_parse_nested() {
        let path =
            parse_criteria_path("bucketEntries.labBatch->labBatches.jiraTicket.ticketName")
                .unwrap();
        let segments = path.segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].hops(), ["bucketEntries".to_string()]);
        assert_eq!(segments[0].link(), Some("labBatch"));
        assert_eq!(segments[0].parent(), None);
        assert_eq!(
            segments[1].hops(),
            ["labBatches".to_string(), "jiraTicket".to_string()]
        );
        assert_eq!(segments[1].parent(), Some(0));
        assert_eq!(path.property(), "ticketName");
    }

    #[test]
    fn test_parse_nested_requires_projection() {
        let err = parse_criteria_path("bucketEntries.labBatch -> batchName").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPath { .. }));
    }

    #[test]
    fn test_parse_rejects_double_dot() {
        match parse_criteria_path("a..b").unwrap_err() {
            ConfigurationError::InvalidPath { position, .. } => assert_eq!(position, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(parse_criteria_path("   ").is_err());
        assert!(parse_order_spec("").is_err());
    }

    #[test]
    fn test_parse_rejects_leading_digit() {
        assert!(parse_criteria_path("1abc").is_err());
    }

    #[test]
    fn test_parse_order_default_direction() {
        let order = parse_order_spec("label").unwrap();
        assert!(order.hops.is_empty());
        assert_eq!(order.property, "label");
        assert_eq!(order.direction, OrderDirection::Asc);
    }

    #[test]
    fn test_parse_order_with_hops_and_direction() {
        let order = parse_order_spec("mercurySamples.sampleKey DESC").unwrap();
        assert_eq!(order.hops, vec!["mercurySamples".to_string()]);
        assert_eq!(order.property, "sampleKey");
        assert_eq!(order.direction, OrderDirection::Desc);
    }

    #[test]
    fn test_parse_order_rejects_trailing_garbage() {
        assert!(parse_order_spec("label sideways").is_err());
    }
}
