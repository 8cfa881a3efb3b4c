//! Backward expansion of query expressions.
//!
//! A file tagged only `cat` must still match a query for `animal` when
//! `cat => animal` holds. [`expand_implications`] rewrites every bare tag
//! constraint into a disjunction of that tag and everything that implies it.

use std::collections::HashMap;
use tagfs_core::{Implication, StoreError, TagValuePair, Transaction};
use tagfs_query::{ComparisonOperator, Expression};
use tracing::debug;

use crate::closure::implications_implying;

/// Alternatives for each bare tag name, keyed by the name used in the query.
pub type Alternatives = HashMap<String, Vec<Expression>>;

/// Rewrite `expression` so that implied tags match their implying tags.
///
/// Unknown tag names are left alone. The input is not modified.
pub async fn expand_implications(
    tx: &mut dyn Transaction,
    expression: &Expression,
    ignore_case: bool,
) -> Result<Expression, StoreError> {
    let alternatives = collect_alternatives(tx, expression, ignore_case).await?;
    if alternatives.is_empty() {
        return Ok(expression.clone());
    }

    let expanded = rewrite(expression, &alternatives);
    debug!("Expanded '{}' to '{}'", expression, expanded);
    Ok(expanded)
}

/// Look up what implies each bare tag in `expression`.
pub async fn collect_alternatives(
    tx: &mut dyn Transaction,
    expression: &Expression,
    ignore_case: bool,
) -> Result<Alternatives, StoreError> {
    let mut names = Vec::new();
    bare_tag_names(expression, &mut names);

    let mut alternatives = Alternatives::new();
    for name in names {
        let Some(tag) = tx.tag_by_name(&name, ignore_case).await? else {
            continue;
        };

        let implying = implications_implying(tx, &[TagValuePair::tag(tag.id)]).await?;
        let mut terms: Vec<Expression> = Vec::new();
        for implication in &implying {
            let term = implying_term(implication);
            if term != Expression::Tag(name.clone()) && !terms.contains(&term) {
                terms.push(term);
            }
        }

        if !terms.is_empty() {
            terms.sort_by_key(ToString::to_string);
            alternatives.insert(name, terms);
        }
    }

    Ok(alternatives)
}

/// The constraint that the implying side of `implication` represents.
fn implying_term(implication: &Implication) -> Expression {
    match &implication.implying_value {
        Some(value) => Expression::comparison(
            implication.implying_tag.name.clone(),
            ComparisonOperator::Equal,
            value.name.clone(),
        ),
        None => Expression::tag(implication.implying_tag.name.clone()),
    }
}

fn bare_tag_names(expression: &Expression, names: &mut Vec<String>) {
    match expression {
        Expression::Tag(name) => {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Expression::Not(operand) => bare_tag_names(operand, names),
        Expression::And(left, right) | Expression::Or(left, right) => {
            bare_tag_names(left, names);
            bare_tag_names(right, names);
        }
        Expression::Empty | Expression::Value(_) | Expression::Comparison(_) => {}
    }
}

/// Replace each bare tag with `tag or alternative...`.
#[must_use]
pub fn rewrite(expression: &Expression, alternatives: &Alternatives) -> Expression {
    match expression {
        Expression::Tag(name) => match alternatives.get(name) {
            Some(terms) => Expression::disjunction(
                std::iter::once(expression.clone()).chain(terms.iter().cloned()),
            ),
            None => expression.clone(),
        },
        Expression::Not(operand) => Expression::not(rewrite(operand, alternatives)),
        Expression::And(left, right) => {
            Expression::and(rewrite(left, alternatives), rewrite(right, alternatives))
        }
        Expression::Or(left, right) => {
            Expression::or(rewrite(left, alternatives), rewrite(right, alternatives))
        }
        Expression::Empty | Expression::Value(_) | Expression::Comparison(_) => {
            expression.clone()
        }
    }
}
