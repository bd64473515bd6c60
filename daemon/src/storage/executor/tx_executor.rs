//! Runs all commands of one transaction under a savepoint.

use log::trace;
use takara_common::transaction::Transaction;

use crate::storage::error::StorageError;
use crate::storage::executor::command_executor::{CommandError, CommandExecutor};

const TX_SAVEPOINT: &str = "savepoint_tx";

/// First failing command with its position inside the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionError {
    pub command_error: CommandError,
    pub command_index: usize,
}

impl std::fmt::Display for TransactionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "command #{}: {}", self.command_index, self.command_error)
    }
}

/// Executes the transaction's commands in order. The first failure rolls the
/// session back to the state before the transaction; success keeps all
/// effects (commands see each other's writes).
pub fn execute_transaction(
    executor: &mut CommandExecutor,
    transaction: &Transaction,
    do_validation: bool,
) -> Result<(), TransactionError> {
    trace!("executing {}", transaction);
    executor.session().savepoint(TX_SAVEPOINT);

    for (index, command) in transaction.commands.iter().enumerate() {
        if let Err(command_error) =
            executor.execute(command, &transaction.creator, do_validation)
        {
            rollback(executor);
            return Err(TransactionError {
                command_error,
                command_index: index,
            });
        }
    }

    if let Err(error) = executor.session().release_savepoint(TX_SAVEPOINT) {
        rollback_on_internal(executor, error);
        return Err(TransactionError {
            command_error: CommandError {
                command_name: "transaction",
                error_code: crate::storage::executor::error_code::INTERNAL,
                error_extra: "failed to release the transaction savepoint".to_string(),
            },
            command_index: 0,
        });
    }
    Ok(())
}

fn rollback(executor: &mut CommandExecutor) {
    if let Err(error) = executor.session().rollback_to_savepoint(TX_SAVEPOINT) {
        log::error!("transaction savepoint rollback failed: {}", error);
    }
}

fn rollback_on_internal(executor: &mut CommandExecutor, error: StorageError) {
    log::error!("transaction savepoint release failed: {}", error);
    let _ = executor.session().rollback_to_savepoint(TX_SAVEPOINT);
}
