//! Document Traverser
//!
//! Walks a subtree, invoking an async callback per node with controllable
//! descent.
//!
//! # Ordering
//!
//! A node's callback starts before any of its children's callbacks. The
//! children of a node are visited as a joined fan-out: each child starts in
//! document order and runs to its first suspension point before the next
//! one starts, but completion order among siblings is unspecified. A call
//! does not resolve until every descendant it issued has been visited.
//!
//! # Errors
//!
//! A failing callback aborts only its own branch: the node's descendants
//! are skipped, every other branch continues, and all failures are returned
//! together from the root call.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;

use futures_util::future::{join_all, LocalBoxFuture};
use futures_util::FutureExt;
use thiserror::Error;

use super::node::{Node, NodeId, NodeType};

/// What the traversal should do after a node's callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Descent {
    /// Visit the node's children.
    #[default]
    Continue,
    /// Skip the node's children.
    Stop,
}

impl From<()> for Descent {
    fn from(_: ()) -> Self {
        Descent::Continue
    }
}

/// A callback failure recorded against the node it happened on.
#[derive(Debug)]
pub struct NodeFailure<E> {
    pub node: NodeId,
    pub error: E,
}

/// Every callback failure of one traversal.
#[derive(Debug, Error)]
#[error("traversal failed at {} node(s)", .failures.len())]
pub struct TraversalError<E: fmt::Debug> {
    pub failures: Vec<NodeFailure<E>>,
}

/// Visit `root` and its descendants.
///
/// A document root is replaced by its document element. When `filter` is
/// non-empty, the callback only runs for nodes of the listed types; other
/// nodes are still descended into.
pub async fn traverse<F, Fut, E>(
    root: &Node,
    callback: F,
    filter: &[NodeType],
) -> Result<(), TraversalError<E>>
where
    F: Fn(Node) -> Fut,
    Fut: Future<Output = Result<Descent, E>>,
    E: fmt::Debug,
{
    let start = match root.node_type() {
        NodeType::Document => root.document_element(),
        _ => Some(root.clone()),
    };
    let Some(start) = start else {
        return Ok(());
    };

    let failures = RefCell::new(Vec::new());
    visit(start, &callback, filter, &failures).await;

    let failures = failures.into_inner();
    if failures.is_empty() {
        Ok(())
    } else {
        tracing::debug!(count = failures.len(), "traversal finished with failures");
        Err(TraversalError { failures })
    }
}

fn visit<'a, F, Fut, E>(
    node: Node,
    callback: &'a F,
    filter: &'a [NodeType],
    failures: &'a RefCell<Vec<NodeFailure<E>>>,
) -> LocalBoxFuture<'a, ()>
where
    F: Fn(Node) -> Fut,
    Fut: Future<Output = Result<Descent, E>> + 'a,
    E: 'a,
{
    async move {
        if filter.is_empty() || filter.contains(&node.node_type()) {
            match callback(node.clone()).await {
                Ok(Descent::Continue) => {}
                Ok(Descent::Stop) => {
                    tracing::trace!(node = %node.id(), "descent stopped");
                    return;
                }
                Err(error) => {
                    failures.borrow_mut().push(NodeFailure {
                        node: node.id(),
                        error,
                    });
                    return;
                }
            }
        }

        let children = node.children();
        join_all(
            children
                .into_iter()
                .map(|child| visit(child, callback, filter, failures)),
        )
        .await;
    }
    .boxed_local()
}
