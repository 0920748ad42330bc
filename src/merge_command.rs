use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use command_executor::command::Command;

use crate::cancellation::CancellationToken;
use crate::failure::FailureSlot;
use crate::merger::merge_group;
use crate::policy::Deadline;

/// One level-1 merge unit: combine a group of sorted runs into an
/// intermediate file and record its path for the final merge. Commands
/// whose pipeline has already been cancelled skip their work so a failed
/// sibling drains the merging pool quickly.
pub(crate) struct MergeGroupCommand {
    group: Vec<PathBuf>,
    target: PathBuf,
    intermediates: Arc<Mutex<Vec<PathBuf>>>,
    deadline: Deadline,
    token: CancellationToken,
    failures: FailureSlot,
}

impl MergeGroupCommand {
    pub(crate) fn new(
        group: Vec<PathBuf>,
        target: PathBuf,
        intermediates: Arc<Mutex<Vec<PathBuf>>>,
        deadline: Deadline,
        token: CancellationToken,
        failures: FailureSlot,
    ) -> MergeGroupCommand {
        MergeGroupCommand {
            group,
            target,
            intermediates,
            deadline,
            token,
            failures,
        }
    }
}

impl Command for MergeGroupCommand {
    fn execute(&self) -> Result<(), anyhow::Error> {
        if self.token.is_cancelled() {
            log::debug!(
                "skipping merge group of {} files, pipeline cancelled",
                self.group.len()
            );
            return Ok(());
        }
        match merge_group(&self.group, &self.target, &self.deadline, &self.token) {
            Ok(_) => {
                self.intermediates.lock().unwrap().push(self.target.clone());
            }
            Err(error) => {
                log::error!(
                    "merge group into {} failed: {:#}",
                    self.target.to_string_lossy(),
                    error
                );
                if self.target.exists() {
                    if let Err(remove_error) = std::fs::remove_file(&self.target) {
                        log::warn!(
                            "failed to remove partial intermediate {}: {}",
                            self.target.to_string_lossy(),
                            remove_error
                        );
                    }
                }
                self.failures.record(error);
                self.token.cancel();
            }
        }
        Ok(())
    }
}
