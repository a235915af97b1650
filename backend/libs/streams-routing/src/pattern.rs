//! Routing pattern parser
//!
//! Grammar, whitespace around tokens ignored:
//!
//! ```text
//! PATTERN   := "*" | CLAUSE (";" CLAUSE)*
//! CLAUSE    := SELECTOR ("{" PROP_LIST? "}")?
//! SELECTOR  := ":"? NAME (":" NAME)*          relationships: exactly one NAME
//! NAME      := [A-Za-z0-9_]+ | "`" [^`]+ "`"
//! PROP_LIST := PROP ("," PROP)*
//! PROP      := "*" | NAME | "-" NAME | "@" NAME
//! ```

use crate::error::{RoutingError, RoutingResult};
use crate::event::EntityType;
use crate::routing::RoutingProperties;
use crate::topic::validate_topic;

const WILDCARD: &str = "*";

/// One parsed `SELECTOR{PROP_LIST}` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternClause {
    /// Labels for nodes, a single type for relationships, empty for `*`
    pub selector: Vec<String>,
    pub properties: RoutingProperties,
}

struct Context<'a> {
    topic: &'a str,
    pattern: &'a str,
}

impl Context<'_> {
    fn error(&self, reason: impl Into<String>) -> RoutingError {
        RoutingError::PatternSyntax {
            pattern: self.pattern.to_string(),
            topic: self.topic.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parse a routing pattern bound to `topic`.
pub fn parse(topic: &str, pattern: &str, kind: EntityType) -> RoutingResult<Vec<PatternClause>> {
    validate_topic(topic)?;

    let ctx = Context { topic, pattern };
    let trimmed = pattern.trim();

    if trimmed == WILDCARD {
        return Ok(vec![PatternClause {
            selector: Vec::new(),
            properties: RoutingProperties::everything(),
        }]);
    }

    if trimmed.is_empty() {
        return Err(ctx.error("pattern is empty"));
    }

    let clauses = split_outside_backticks(trimmed, ';')
        .ok_or_else(|| ctx.error("unterminated back-tick"))?;

    let mut parsed = Vec::new();
    for clause in clauses {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        parsed.push(parse_clause(&ctx, clause, kind)?);
    }

    if parsed.is_empty() {
        return Err(ctx.error("pattern has no clauses"));
    }

    Ok(parsed)
}

fn parse_clause(
    ctx: &Context<'_>,
    clause: &str,
    kind: EntityType,
) -> RoutingResult<PatternClause> {
    let (selector, prop_list) = match find_outside_backticks(clause, '{') {
        Some(open) => {
            let rest = clause[open + 1..].trim_end();
            let inner = rest.strip_suffix('}').ok_or_else(|| {
                ctx.error(format!("clause '{}' is missing a closing '}}'", clause))
            })?;
            (&clause[..open], Some(inner))
        }
        None => {
            if find_outside_backticks(clause, '}').is_some() {
                return Err(ctx.error(format!("clause '{}' has an unmatched '}}'", clause)));
            }
            (clause, None)
        }
    };

    let selector = parse_selector(ctx, selector)?;
    if kind == EntityType::Relationship && selector.len() > 1 {
        return Err(ctx.error(format!(
            "a relationship clause takes exactly one type, found {}",
            selector.len()
        )));
    }

    let properties = match prop_list {
        Some(list) => parse_prop_list(ctx, list)?,
        None => RoutingProperties::everything(),
    };

    Ok(PatternClause {
        selector,
        properties,
    })
}

fn parse_selector(ctx: &Context<'_>, selector: &str) -> RoutingResult<Vec<String>> {
    let selector = selector.trim();
    let selector = selector.strip_prefix(':').unwrap_or(selector);

    if selector.trim().is_empty() {
        return Err(ctx.error("clause has no label or type"));
    }

    let names = split_outside_backticks(selector, ':')
        .ok_or_else(|| ctx.error("unterminated back-tick"))?;

    names
        .into_iter()
        .map(|name| parse_name(ctx, name.trim()))
        .collect()
}

fn parse_prop_list(ctx: &Context<'_>, list: &str) -> RoutingResult<RoutingProperties> {
    let mut properties = RoutingProperties::default();

    if list.trim().is_empty() {
        properties.all = true;
        return Ok(properties);
    }

    let entries =
        split_outside_backticks(list, ',').ok_or_else(|| ctx.error("unterminated back-tick"))?;
    let mut wildcard = false;

    for entry in entries {
        let entry = entry.trim();
        if entry == WILDCARD {
            wildcard = true;
        } else if let Some(name) = entry.strip_prefix('-') {
            properties.exclude.push(parse_name(ctx, name.trim())?);
        } else if let Some(name) = entry.strip_prefix('@') {
            properties.filter.push(parse_name(ctx, name.trim())?);
        } else {
            properties.include.push(parse_name(ctx, entry)?);
        }
    }

    if wildcard {
        properties.include.clear();
        properties.exclude.clear();
    }
    properties.all = wildcard || (properties.include.is_empty() && properties.exclude.is_empty());

    Ok(properties)
}

fn parse_name(ctx: &Context<'_>, token: &str) -> RoutingResult<String> {
    if let Some(quoted) = token.strip_prefix('`') {
        return match quoted.strip_suffix('`') {
            Some(name) if !name.is_empty() && !name.contains('`') => Ok(name.to_string()),
            _ => Err(ctx.error(format!("malformed quoted name '{}'", token))),
        };
    }

    if token.is_empty() {
        return Err(ctx.error("empty name"));
    }

    if !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ctx.error(format!("invalid name '{}'", token)));
    }

    Ok(token.to_string())
}

fn find_outside_backticks(input: &str, target: char) -> Option<usize> {
    let mut quoted = false;
    for (idx, c) in input.char_indices() {
        match c {
            '`' => quoted = !quoted,
            c if c == target && !quoted => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Split on `separator` ignoring separators inside back-ticks.
///
/// Returns `None` when a back-tick is left open.
fn split_outside_backticks(input: &str, separator: char) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;

    for (idx, c) in input.char_indices() {
        match c {
            '`' => quoted = !quoted,
            c if c == separator && !quoted => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }

    if quoted {
        return None;
    }

    parts.push(&input[start..]);
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(pattern: &str) -> RoutingResult<Vec<PatternClause>> {
        parse("topic", pattern, EntityType::Node)
    }

    #[test]
    fn test_include_and_exclude() {
        let clauses = node("Person{name,-age}").unwrap();

        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].selector, vec!["Person"]);
        assert!(!clauses[0].properties.all);
        assert_eq!(clauses[0].properties.include, vec!["name"]);
        assert_eq!(clauses[0].properties.exclude, vec!["age"]);
    }

    #[test]
    fn test_wildcard_pattern() {
        let clauses = node("  *  ").unwrap();

        assert_eq!(clauses.len(), 1);
        assert!(clauses[0].selector.is_empty());
        assert_eq!(clauses[0].properties, RoutingProperties::everything());
    }

    #[test]
    fn test_absent_and_empty_prop_list_select_all() {
        for pattern in ["Person", "Person{}", "Person{ }", "Person{*}"] {
            let clauses = node(pattern).unwrap();
            assert!(clauses[0].properties.all, "{} should select all", pattern);
        }
    }

    #[test]
    fn test_filter_only_list_selects_all() {
        let clauses = node("Person{@email}").unwrap();

        assert!(clauses[0].properties.all);
        assert_eq!(clauses[0].properties.filter, vec!["email"]);
    }

    #[test]
    fn test_wildcard_clears_include_and_exclude() {
        let clauses = node("Person{name,*,-age,@id}").unwrap();
        let properties = &clauses[0].properties;

        assert!(properties.all);
        assert!(properties.include.is_empty());
        assert!(properties.exclude.is_empty());
        assert_eq!(properties.filter, vec!["id"]);
    }

    #[test]
    fn test_multiple_clauses_and_whitespace() {
        let clauses = node(" Person { name , surname } ; :Employee:Manager ; ").unwrap();

        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].properties.include, vec!["name", "surname"]);
        assert_eq!(clauses[1].selector, vec!["Employee", "Manager"]);
    }

    #[test]
    fn test_backtick_labels() {
        let clauses = node("`My Label`:`Semi;Colon`{`first name`}").unwrap();

        assert_eq!(clauses[0].selector, vec!["My Label", "Semi;Colon"]);
        assert_eq!(clauses[0].properties.include, vec!["first name"]);
    }

    #[test]
    fn test_relationship_with_two_types_is_rejected() {
        let err = parse("rels", "KNOWS:LIKES{since}", EntityType::Relationship).unwrap_err();

        match err {
            RoutingError::PatternSyntax { pattern, topic, .. } => {
                assert_eq!(pattern, "KNOWS:LIKES{since}");
                assert_eq!(topic, "rels");
            }
            other => panic!("Unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_malformed_patterns() {
        let malformed = [
            "",
            "Person{name",
            "Person}name{",
            "Person name",
            "{name}",
            "Person{na me}",
            "Person{name,,age}",
            "`Person",
            "Person{-}",
            "Person::Employee",
        ];

        for pattern in malformed {
            let err = node(pattern).unwrap_err();
            assert!(
                matches!(err, RoutingError::PatternSyntax { .. }),
                "{:?} should be a syntax error, got {:?}",
                pattern,
                err
            );
        }
    }

    #[test]
    fn test_invalid_topic_is_reported_before_pattern() {
        let err = parse("..", "*", EntityType::Node).unwrap_err();
        assert!(matches!(err, RoutingError::InvalidTopic { .. }));
    }
}
