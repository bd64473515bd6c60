//! Scoped world state for stateful validation of candidate transactions.
//!
//! Each applied transaction runs under its own savepoint; the outer session
//! stays open so more transactions can be piled on. Dropping the temporary
//! WSV rolls everything back, promoting it via `prepare` hands the pending
//! state to the two-phase commit machinery.

use log::{debug, trace};
use takara_common::transaction::Transaction;

use crate::storage::error::StorageError;
use crate::storage::executor::command_executor::{CommandError, CommandExecutor};
use crate::storage::executor::{error_code, execute_transaction};
use crate::storage::wsv::query;

const TEMP_WSV_SAVEPOINT: &str = "savepoint_temp_wsv";
const SIGNATURES_VALIDATION: &str = "signatures_validation";

pub struct TemporaryWsv {
    executor: Option<CommandExecutor>,
}

impl TemporaryWsv {
    pub fn new(mut executor: CommandExecutor) -> Result<Self, StorageError> {
        executor.session().begin()?;
        Ok(Self {
            executor: Some(executor),
        })
    }

    fn executor(&mut self) -> &mut CommandExecutor {
        self.executor.as_mut().expect("present until consumed")
    }

    /// Validates the transaction's signatures against the creator's
    /// signatories and quorum, then applies it.
    pub fn apply(&mut self, transaction: &Transaction) -> Result<(), CommandError> {
        trace!("temporary apply of {}", transaction);
        self.validate_signatures(transaction)?;

        self.executor().session().savepoint(TEMP_WSV_SAVEPOINT);
        match execute_transaction(self.executor(), transaction, true) {
            Ok(()) => {
                self.executor()
                    .session()
                    .release_savepoint(TEMP_WSV_SAVEPOINT)
                    .map_err(|e| CommandError {
                        command_name: "transaction",
                        error_code: error_code::INTERNAL,
                        error_extra: e.to_string(),
                    })?;
                Ok(())
            }
            Err(error) => {
                if let Err(rollback_error) = self
                    .executor()
                    .session()
                    .rollback_to_savepoint(TEMP_WSV_SAVEPOINT)
                {
                    log::error!("temporary WSV rollback failed: {}", rollback_error);
                }
                Err(error.command_error)
            }
        }
    }

    fn validate_signatures(&mut self, transaction: &Transaction) -> Result<(), CommandError> {
        let payload = transaction.payload_bytes();
        let session = self.executor().session();

        let quorum = query::get_account_quorum(session, &transaction.creator)
            .map_err(|e| CommandError {
                command_name: SIGNATURES_VALIDATION,
                error_code: 1,
                error_extra: e.to_string(),
            })?
            .ok_or_else(|| CommandError {
                command_name: SIGNATURES_VALIDATION,
                error_code: 1,
                error_extra: format!("creator account {} not found", transaction.creator),
            })?;
        let signatories =
            query::get_signatories(session, &transaction.creator).map_err(|e| CommandError {
                command_name: SIGNATURES_VALIDATION,
                error_code: 1,
                error_extra: e.to_string(),
            })?;

        let matching = transaction
            .signatures
            .iter()
            .filter(|signature| {
                signatories.contains(&signature.public_key) && signature.verify(&payload)
            })
            .count();

        if matching != transaction.signatures.len() || matching < quorum as usize {
            debug!(
                "{} failed signatures validation: {} matching of {}, quorum {}",
                transaction,
                matching,
                transaction.signatures.len(),
                quorum
            );
            return Err(CommandError {
                command_name: SIGNATURES_VALIDATION,
                error_code: 2,
                error_extra: format!("{} failed signatures validation", transaction),
            });
        }
        Ok(())
    }

    /// Hands the executor (with its still-open session) to the caller, e.g.
    /// to promote the pending state into a prepared transaction.
    pub fn into_executor(mut self) -> CommandExecutor {
        self.executor.take().expect("present until consumed")
    }
}

impl Drop for TemporaryWsv {
    fn drop(&mut self) {
        if let Some(mut executor) = self.executor.take() {
            if executor.session().is_active() {
                if let Err(error) = executor.session().rollback() {
                    log::error!("temporary WSV rollback failed: {}", error);
                }
            }
        }
    }
}
