//! Log entry normalization.
//!
//! Raw log entries become [`OplogTrigger`]s here: plain writes map 1:1,
//! drop commands set the corresponding flags, and transaction commits are
//! expanded into their constituent operations. Expansion is iterative
//! over an explicit work stack, so arbitrarily nested batches cannot grow
//! the call stack, and every sub-operation receives a synthetic,
//! strictly increasing position derived from its parent when the log did
//! not record one.

use crate::error::ProtocolError;
use crate::oplog::entry::{CommandOp, LogPosition, OplogEntry, OplogOp};
use crate::oplog::filter::ADMIN_COMMAND_NAMESPACE;
use crate::oplog::triggers::OplogTrigger;

/// Suffix of the per-database command namespace (`db.$cmd`).
const COMMAND_COLLECTION: &str = "$cmd";

fn unknown_command(entry: &OplogEntry) -> ProtocolError {
    ProtocolError::UnknownCommand {
        position: entry.position,
        command: serde_json::to_string(&entry.op)
            .unwrap_or_else(|_| format!("{:?}", entry.op)),
    }
}

/// Expands a transaction batch into full entries, synthesizing positions
/// for sub-operations that lack one: the first such gets the parent's
/// position, the next parent+1, and so on. Sub-operations carrying their
/// own position keep it.
fn expand_transaction(
    parent_position: LogPosition,
    operations: Vec<crate::oplog::entry::TxOperation>,
) -> Vec<OplogEntry> {
    let mut next_position = parent_position;
    let mut expanded = Vec::with_capacity(operations.len());
    for operation in operations {
        let position = match operation.position {
            Some(position) => position,
            None => {
                let position = next_position;
                next_position = next_position.next();
                position
            }
        };
        expanded.push(OplogEntry {
            position,
            namespace: operation.namespace,
            op: operation.op,
        });
    }
    expanded
}

/// Normalizes one log entry into the triggers it should fire, in order.
///
/// # Errors
///
/// `ProtocolError::UnknownCommand` for any command the sequencer does not
/// understand, including commands in namespaces where they cannot occur.
/// The caller treats that as fatal.
pub(crate) fn normalize_entry(
    db_name: &str,
    entry: OplogEntry,
) -> Result<Vec<OplogTrigger>, ProtocolError> {
    let db_prefix = format!("{db_name}.");
    let mut triggers = Vec::new();

    // Depth-first, in-order walk: children of an expanded transaction are
    // pushed in reverse so they pop in sub-operation order, ahead of any
    // entries queued after their parent.
    let mut work = vec![entry];
    while let Some(entry) = work.pop() {
        if entry.namespace == ADMIN_COMMAND_NAMESPACE {
            match entry.op {
                OplogOp::Command(CommandOp::ApplyOps { operations }) => {
                    for child in expand_transaction(entry.position, operations)
                        .into_iter()
                        .rev()
                    {
                        work.push(child);
                    }
                    continue;
                }
                _ => return Err(unknown_command(&entry)),
            }
        }

        let collection = entry
            .namespace
            .strip_prefix(&db_prefix)
            .map(str::to_string);

        if collection.as_deref() == Some(COMMAND_COLLECTION) {
            match &entry.op {
                OplogOp::Command(CommandOp::DropDatabase) => {
                    triggers.push(OplogTrigger {
                        collection: None,
                        id: None,
                        drop_collection: false,
                        drop_database: true,
                        entry,
                    });
                }
                OplogOp::Command(CommandOp::DropCollection { collection }) => {
                    let dropped = collection.clone();
                    triggers.push(OplogTrigger {
                        collection: Some(dropped),
                        id: None,
                        drop_collection: true,
                        drop_database: false,
                        entry,
                    });
                }
                OplogOp::Command(CommandOp::CreateCollection { .. }) => {
                    // Implicit creation inside a transaction; nothing to
                    // tell subscribers.
                }
                _ => return Err(unknown_command(&entry)),
            }
            continue;
        }

        // Plain insert/update/delete. A command anywhere else is unknown
        // territory; refuse rather than guess.
        let Some(id) = entry.op.subject_id().cloned() else {
            return Err(unknown_command(&entry));
        };
        triggers.push(OplogTrigger {
            collection,
            id: Some(id),
            drop_collection: false,
            drop_database: false,
            entry,
        });
    }

    Ok(triggers)
}
