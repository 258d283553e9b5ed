use crate::error::Result;
use crate::prompt::Prompter;
use crate::shell::{self, CommandRunner, Invocation};

/// What to do once settings are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebootDecision {
    Yes,
    No,
    #[default]
    Ask,
}

/// Report success and reboot if asked to. Returns whether a reboot was issued.
pub fn finalize(
    decision: RebootDecision,
    runner: &mut dyn CommandRunner,
    prompter: &mut dyn Prompter,
) -> Result<bool> {
    println!("\nSuccess!\n");
    println!("Settings take effect on next boot.\n");

    let reboot = match decision {
        RebootDecision::Yes => true,
        RebootDecision::No => false,
        RebootDecision::Ask => prompter.confirm("REBOOT NOW?", true)?,
    };
    if !reboot {
        println!("Exiting without reboot.");
        return Ok(false);
    }

    println!("Reboot started...");
    shell::run_checked(runner, &Invocation::new("reboot"))?;
    Ok(true)
}
