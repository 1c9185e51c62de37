//! Walks an adapter's advisors in order, building the advice tree one field at a
//! time.
//!
//! A field whose value was already supplied only shows up in the resulting tree if
//! it turns out to be invalid: valid supplied values are silently skipped over
//! (they don't need advising), and only fields still requiring advice produce
//! branching nodes. This keeps the tree focused on what the caller still has to
//! decide.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};

use crate::advice::{AdvisedValue, Edge, FieldAdvice};
use crate::advisor::{Discoverable, EdgeContext, FieldAdvisor};

/// Normalize [`FieldAdvisor::order`] into an actual sort position: non-negative
/// orders sort first, in the given order; negative orders count back from the
/// end (-1 last, -2 second-to-last, ...), landing after every non-negative
/// order as long as no adapter declares 999 or more advisors.
fn order_sort_key(order: i32) -> i32 {
    if order >= 0 {
        order
    } else {
        999 + order
    }
}

/// Run discovery for `adapter`, returning the root of the advice tree, or `None` if
/// every field was already supplied with a valid value and nothing needs advice.
pub async fn generate_advice(adapter: &dyn Discoverable) -> Option<FieldAdvice> {
    let mut advisors = adapter.advisors();
    advisors.sort_by_key(|a| order_sort_key(a.order()));

    build(&advisors, 0, adapter.params(), EdgeContext::new())
        .await
        .and_then(|edge| match edge {
            Edge::Advice(advice) => Some(*advice),
            Edge::Error(_) | Edge::Partial | Edge::Done => None,
        })
}

fn build<'a>(
    advisors: &'a [std::sync::Arc<dyn FieldAdvisor>],
    idx: usize,
    params: &'a Map<String, Value>,
    ctx: EdgeContext,
) -> BoxFuture<'a, Option<Edge>> {
    async move {
        let advisor = advisors.get(idx)?;
        let field = advisor.field().to_string();
        let supplied = params.get(&field);

        match supplied {
            Some(value) => validate_supplied(advisors, idx, params, ctx, advisor.as_ref(), &field, value).await,
            None => Some(advise_missing(advisors, idx, params, ctx, advisor.as_ref(), &field).await),
        }
    }
    .boxed()
}

/// A field the caller already gave a value for: if it checks out, it is invisible
/// in the tree and we move straight on to the next field with an extended context;
/// if it doesn't, this field becomes a single-branch node carrying the error.
async fn validate_supplied<'a>(
    advisors: &'a [std::sync::Arc<dyn FieldAdvisor>],
    idx: usize,
    params: &'a Map<String, Value>,
    ctx: EdgeContext,
    advisor: &dyn FieldAdvisor,
    field: &str,
    value: &Value,
) -> Option<Edge> {
    match advisor.advise(Some(value), &ctx).await {
        Err(msg) => Some(Edge::Advice(Box::new(FieldAdvice::Single {
            field: field.to_string(),
            value: value.clone(),
            edge: Box::new(Edge::Error(msg)),
        }))),
        Ok(advised) => match advised.validate(value) {
            Some(msg) => Some(Edge::Advice(Box::new(FieldAdvice::Single {
                field: field.to_string(),
                value: value.clone(),
                edge: Box::new(Edge::Error(msg)),
            }))),
            None => {
                let next_ctx = ctx.with(field, value.clone());
                match build(advisors, idx + 1, params, next_ctx).await {
                    Some(edge) => Some(edge),
                    None => Some(Edge::Done),
                }
            }
        },
    }
}

/// A field the caller left unset: every accepted branch becomes a node in the
/// tree, recursing into the remaining advisors for each one (unless the branch is
/// marked partial, in which case discovery is deliberately cut short there).
async fn advise_missing<'a>(
    advisors: &'a [std::sync::Arc<dyn FieldAdvisor>],
    idx: usize,
    params: &'a Map<String, Value>,
    ctx: EdgeContext,
    advisor: &dyn FieldAdvisor,
    field: &str,
) -> Edge {
    match advisor.advise(None, &ctx).await {
        Err(msg) => Edge::Error(msg),
        Ok(advised) => {
            let branches_advice = advised.iterate_advice_branches();
            let mut branches = Vec::with_capacity(branches_advice.len());
            for option in branches_advice {
                let branch_value = option.as_pydantic_value();
                let edge = if option.break_on_advice() {
                    Edge::Partial
                } else {
                    let assumed = option.assumed_value().unwrap_or(Value::Null);
                    let next_ctx = ctx.with(field, assumed);
                    match build(advisors, idx + 1, params, next_ctx).await {
                        Some(edge) => edge,
                        None => Edge::Done,
                    }
                };
                branches.push((branch_value, edge));
            }

            if branches.len() == 1 {
                let (value, edge) = branches.into_iter().next().expect("checked len == 1");
                Edge::Advice(Box::new(FieldAdvice::Single {
                    field: field.to_string(),
                    value,
                    edge: Box::new(edge),
                }))
            } else {
                Edge::Advice(Box::new(FieldAdvice::Branch {
                    field: field.to_string(),
                    branches,
                }))
            }
        }
    }
}
