use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::models::{Graph, UserId};

/// Public message returned for every non-owner mutation attempt.
pub const ACCESS_DENIED_MESSAGE: &str = "You do not have permission to modify this graph";

pub fn is_owner(graph: &Graph, caller: UserId) -> bool {
    graph.owner_id == caller
}

/// Owner-only gate run before any state change to a graph or its members.
pub fn authorize(graph: &Graph, caller: UserId) -> Result<()> {
    if is_owner(graph, caller) {
        return Ok(());
    }

    tracing::warn!(
        graph_id = %graph.id,
        owner_id = %graph.owner_id,
        caller_id = %caller,
        "rejected graph mutation by non-owner"
    );
    Err(LibError::access_denied(
        ACCESS_DENIED_MESSAGE,
        anyhow!(
            "user {} attempted to modify graph {} owned by {}",
            caller,
            graph.id,
            graph.owner_id
        ),
    ))
}
